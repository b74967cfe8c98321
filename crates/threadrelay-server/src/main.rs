//! Threadrelay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Development, seeded with sessions and threads
//! threadrelay-server --bind 127.0.0.1:3000 --fixture dev.json
//!
//! # Production
//! INCOMING_MESSAGE_SECRET=... SEND_MESSAGE_WEBHOOK_URL=https://... \
//!     threadrelay-server --bind 0.0.0.0:3000
//! ```

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use threadrelay_server::{DriverConfig, Heartbeat, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Realtime thread-message relay
#[derive(Parser, Debug)]
#[command(name = "threadrelay-server")]
#[command(about = "Realtime thread-message relay over WebSocket")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Per-connection outbound queue capacity
    #[arg(long, default_value = "256")]
    outbound_queue: usize,

    /// Seconds between WebSocket pings
    #[arg(long, default_value = "30")]
    heartbeat_secs: u64,

    /// Heartbeats a peer may leave unanswered before it is disconnected
    #[arg(long, default_value = "3")]
    max_missed_heartbeats: u32,

    /// Shared secret required on automation message posts
    #[arg(long, env = "INCOMING_MESSAGE_SECRET", hide_env_values = true)]
    incoming_secret: Option<String>,

    /// Webhook that user-sent messages are forwarded to before being stored
    #[arg(long, env = "SEND_MESSAGE_WEBHOOK_URL")]
    send_message_webhook: Option<String>,

    /// JSON fixture to seed storage with
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Threadrelay server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        incoming_secret: args.incoming_secret,
        send_message_webhook: args.send_message_webhook,
        outbound_queue: args.outbound_queue,
        heartbeat: Heartbeat {
            interval: Duration::from_secs(args.heartbeat_secs.max(1)),
            max_missed: args.max_missed_heartbeats.max(1),
        },
        fixture: args.fixture,
        driver: DriverConfig { max_connections: args.max_connections },
    };

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("startup failed: {}", e);
            return ExitCode::FAILURE;
        },
    };

    match server.local_addr() {
        Ok(addr) => tracing::info!("Server listening on {}", addr),
        Err(e) => tracing::warn!("could not read local address: {}", e),
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown signal received");
    };

    if let Err(e) = server.run_until(shutdown).await {
        tracing::error!("server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
