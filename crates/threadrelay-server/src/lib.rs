//! Threadrelay production server.
//!
//! Realtime relay that pushes newly created thread messages to every browser
//! connection currently viewing that thread. Messages enter through HTTP
//! (automation with a shared secret, or a signed-in user), are persisted, and
//! are then fanned out over WebSocket to the thread's room.
//!
//! # Architecture
//!
//! The [`RelayDriver`] follows the Sans-IO pattern: it owns the
//! [`ConnectionRegistry`] and [`RoomBroadcaster`], consumes [`RelayEvent`]s
//! and returns [`RelayAction`]s. [`Relay`] wraps it in a single async mutex
//! with per-connection outbound queues and executes those actions against
//! real sockets.
//!
//! # Components
//!
//! - [`RelayDriver`]: action-based orchestrator (pure logic, no I/O)
//! - [`Relay`]: runtime handle and [`Publisher`] implementation
//! - [`MessageIngest`]: persist-then-publish bridge used by HTTP handlers
//! - [`MessageWebhook`]: forwards user-sent messages to the automation
//! - [`Server`]: axum listener wiring everything together
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod broadcaster;
mod driver;
mod env;
mod error;
mod http;
mod ingest;
mod listener;
mod registry;
mod relay;
mod server_error;
pub mod storage;
mod system_env;
mod transport;
mod webhook;

use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc};

use axum::Router;
pub use broadcaster::{DeliveryError, EmitReport, Outbound, RoomBroadcaster};
pub use driver::{DriverConfig, LogLevel, RelayAction, RelayDriver, RelayEvent};
pub use env::Environment;
pub use error::ServerError;
pub use http::{ApiError, AppState, ThreadView, router};
pub use ingest::{IngestError, MessageIngest, MessageOrigin};
pub use registry::{ConnectionInfo, ConnectionRegistry};
pub use relay::{OutboundChannels, Publisher, Relay};
pub use server_error::DriverError;
pub use storage::{ChaoticStorage, Fixture, MemoryStorage, Storage, StorageError, StoredThread};
pub use system_env::SystemEnv;
use tokio::net::TcpListener;
pub use transport::{Heartbeat, PeerLiveness, run_connection};
pub use webhook::{MessageWebhook, SESSION_KEY_HEADER, WebhookError};

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000")
    pub bind_address: String,
    /// Shared secret required on automation message posts
    pub incoming_secret: Option<String>,
    /// URL user-sent messages are forwarded to before being stored
    pub send_message_webhook: Option<String>,
    /// Capacity of each connection's outbound queue
    pub outbound_queue: usize,
    /// WebSocket ping cadence and eviction deadline
    pub heartbeat: Heartbeat,
    /// JSON file of sessions, threads and messages to seed storage with
    pub fixture: Option<PathBuf>,
    /// Driver configuration (limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            incoming_secret: None,
            send_message_webhook: None,
            outbound_queue: 256,
            heartbeat: Heartbeat::default(),
            fixture: None,
            driver: DriverConfig::default(),
        }
    }
}

/// Production threadrelay server.
///
/// In-memory storage, system environment, axum over a TCP listener.
pub struct Server {
    listener: TcpListener,
    router: Router,
    relay: Relay<MemoryStorage>,
    storage: MemoryStorage,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// Loads the fixture (if configured) before binding, so a bad fixture
    /// fails startup without ever accepting a connection.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let storage = MemoryStorage::new();

        if let Some(path) = &config.fixture {
            let fixture = Fixture::from_path(path).map_err(|e| {
                ServerError::Config(format!("failed to load fixture {}: {e}", path.display()))
            })?;
            fixture.apply(&storage)?;
        }

        if config.incoming_secret.is_none() {
            tracing::warn!("no incoming secret configured; automation posts will be rejected");
        }

        let webhook = match &config.send_message_webhook {
            Some(url) => {
                let webhook = MessageWebhook::new(url, MessageWebhook::DEFAULT_TIMEOUT)
                    .map_err(|e| ServerError::Config(e.to_string()))?;
                Some(Arc::new(webhook))
            },
            None => {
                tracing::warn!("no send-message webhook configured; user messages stay local");
                None
            },
        };

        let relay = Relay::new(storage.clone(), config.driver, config.outbound_queue);
        let ingest = Arc::new(MessageIngest::new(env.clone(), storage.clone(), relay.clone()));

        let state = AppState {
            env,
            relay: relay.clone(),
            storage: storage.clone(),
            ingest,
            incoming_secret: config.incoming_secret.map(Arc::from),
            webhook,
            heartbeat: config.heartbeat,
        };

        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ServerError::Transport(format!("failed to bind {}: {e}", config.bind_address))
        })?;

        Ok(Self { listener, router: router(state), relay, storage })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Relay handle, for publishing from in-process callers.
    pub fn relay(&self) -> &Relay<MemoryStorage> {
        &self.relay
    }

    /// Storage backend.
    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }

    /// Run the server until it can no longer accept connections.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server until `shutdown` resolves.
    ///
    /// Returns [`ServerError::Transport`] if accepting fails for a reason
    /// other than a single misbehaving peer, such as descriptor exhaustion.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Server starting on {}", self.listener.local_addr()?);

        listener::serve_until(self.listener, self.router, shutdown).await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}
