//! Relay runtime handle.
//!
//! Wraps the Sans-IO [`RelayDriver`] together with the per-connection
//! outbound queues behind a single async mutex. Every join, leave, disconnect
//! and publish goes through that mutex, so they are applied one at a time in
//! arrival order and a fan-out always sees the membership of the moment it
//! runs. Outbound delivery is a non-blocking `try_send`; the socket writer
//! tasks drain the queues independently.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use threadrelay_proto::{ClientEvent, ConnectionId, MessageRecord, ServerEvent, ThreadId, UserId};
use tokio::sync::{Mutex, mpsc};

use crate::{
    broadcaster::{DeliveryError, EmitReport, Outbound},
    driver::{DriverConfig, LogLevel, RelayAction, RelayDriver, RelayEvent},
    server_error::DriverError,
    storage::Storage,
};

/// Process-wide publish capability.
///
/// Handed to whatever builds the HTTP handlers so they can fan out newly
/// persisted messages without reaching for global state.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver `message` to every connection currently in `thread_id`'s room.
    async fn publish(&self, thread_id: &ThreadId, message: MessageRecord) -> EmitReport;
}

/// Bounded outbound queues, one per live connection.
#[derive(Debug, Default)]
pub struct OutboundChannels {
    senders: HashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
}

impl OutboundChannels {
    fn insert(&mut self, connection_id: ConnectionId, sender: mpsc::Sender<ServerEvent>) {
        self.senders.insert(connection_id, sender);
    }

    fn remove(&mut self, connection_id: ConnectionId) {
        self.senders.remove(&connection_id);
    }
}

impl Outbound for OutboundChannels {
    fn deliver(
        &mut self,
        connection_id: ConnectionId,
        event: &ServerEvent,
    ) -> Result<(), DeliveryError> {
        let sender =
            self.senders.get(&connection_id).ok_or(DeliveryError::ConnectionGone(connection_id))?;

        sender.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull(connection_id),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::ConnectionGone(connection_id),
        })
    }
}

struct RelayState<S: Storage> {
    driver: RelayDriver<S>,
    outbound: OutboundChannels,
}

/// Cloneable handle to the relay.
///
/// Construct once at startup and pass clones to the transport and to the
/// ingestion bridge.
pub struct Relay<S: Storage> {
    state: Arc<Mutex<RelayState<S>>>,
    queue_capacity: usize,
}

impl<S: Storage> Clone for Relay<S> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state), queue_capacity: self.queue_capacity }
    }
}

impl<S: Storage> Relay<S> {
    /// Create a relay. `queue_capacity` bounds each connection's outbound
    /// queue; a full queue drops the event for that connection only.
    pub fn new(storage: S, config: DriverConfig, queue_capacity: usize) -> Self {
        let state = RelayState {
            driver: RelayDriver::new(storage, config),
            outbound: OutboundChannels::default(),
        };
        Self { state: Arc::new(Mutex::new(state)), queue_capacity: queue_capacity.max(1) }
    }

    /// Register a connection for an authenticated user.
    ///
    /// Returns the connection id and the receiving end of its outbound queue.
    pub async fn connect(
        &self,
        user_id: UserId,
    ) -> Result<(ConnectionId, mpsc::Receiver<ServerEvent>), DriverError> {
        let mut state = self.state.lock().await;

        let connection_id = state.driver.connect(user_id.clone())?;
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        state.outbound.insert(connection_id, tx);

        tracing::info!(%connection_id, %user_id, "connection registered");
        Ok((connection_id, rx))
    }

    /// Decode and process one inbound frame.
    pub async fn handle_frame(&self, connection_id: ConnectionId, frame: &[u8]) {
        let event = match ClientEvent::decode(frame) {
            Ok(event) => RelayEvent::ClientEventReceived { connection_id, event },
            Err(error) => RelayEvent::MalformedFrame { connection_id, error },
        };
        self.process(event).await;
    }

    /// Process an already decoded client event.
    pub async fn handle_event(&self, connection_id: ConnectionId, event: ClientEvent) {
        self.process(RelayEvent::ClientEventReceived { connection_id, event }).await;
    }

    /// Tear a connection down: drop its outbound queue and leave every room.
    ///
    /// Both happen under one lock acquisition, so no fan-out can observe a
    /// half-removed connection. Safe to call more than once.
    pub async fn disconnect(&self, connection_id: ConnectionId, reason: &str) {
        let mut state = self.state.lock().await;
        let RelayState { driver, outbound } = &mut *state;

        outbound.remove(connection_id);
        match driver.process_event(RelayEvent::ConnectionClosed {
            connection_id,
            reason: reason.to_string(),
        }) {
            Ok(actions) => execute_actions(actions, outbound),
            Err(e) => tracing::debug!("disconnect processing error: {}", e),
        }
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.driver.connection_count()
    }

    /// Check if a connection is a member of a thread's room.
    pub async fn is_member(&self, connection_id: ConnectionId, thread_id: &ThreadId) -> bool {
        self.state.lock().await.driver.is_member(connection_id, thread_id)
    }

    async fn process(&self, event: RelayEvent) {
        let mut state = self.state.lock().await;
        let RelayState { driver, outbound } = &mut *state;

        match driver.process_event(event) {
            Ok(actions) => execute_actions(actions, outbound),
            Err(e) => tracing::debug!("event processing error: {}", e),
        }
    }
}

#[async_trait]
impl<S: Storage> Publisher for Relay<S> {
    async fn publish(&self, thread_id: &ThreadId, message: MessageRecord) -> EmitReport {
        let mut state = self.state.lock().await;
        let RelayState { driver, outbound } = &mut *state;

        let report = driver.publish(thread_id, message, outbound);
        tracing::debug!(
            thread_id = %thread_id,
            delivered = report.delivered,
            failed = report.failed,
            "published message"
        );
        report
    }
}

/// Execute driver actions.
fn execute_actions(actions: Vec<RelayAction>, outbound: &mut OutboundChannels) {
    for action in actions {
        match action {
            RelayAction::SendToConnection { connection_id, event } => {
                if let Err(e) = outbound.deliver(connection_id, &event) {
                    tracing::warn!("SendToConnection failed: {}", e);
                }
            },

            RelayAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use threadrelay_proto::{ErrorCode, MessageId, ServerEvent};

    use super::*;
    use crate::storage::{MemoryStorage, StoredThread};

    fn thread(raw: &str) -> ThreadId {
        ThreadId::parse(raw).unwrap()
    }

    fn relay_with_thread(id: &str, owner: &str, capacity: usize) -> Relay<MemoryStorage> {
        let storage = MemoryStorage::new();
        storage
            .create_thread(&StoredThread {
                id: thread(id),
                author_id: UserId::new(owner),
                title: String::new(),
            })
            .unwrap();
        Relay::new(storage, DriverConfig::default(), capacity)
    }

    fn record(id: &str, thread_id: &str) -> MessageRecord {
        MessageRecord {
            id: MessageId::new(id),
            thread_id: thread(thread_id),
            content: "hi".to_string(),
            author_id: None,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn join_then_publish_delivers_once() {
        let relay = relay_with_thread("t1", "alice", 8);
        let (a, mut rx) = relay.connect(UserId::new("alice")).await.unwrap();

        relay.handle_event(a, ClientEvent::JoinThread(thread("t1"))).await;
        assert_eq!(rx.recv().await, Some(ServerEvent::JoinedThread(thread("t1"))));

        let report = relay.publish(&thread("t1"), record("m1", "t1")).await;
        assert_eq!(report, EmitReport { delivered: 1, failed: 0 });
        assert_eq!(rx.recv().await, Some(ServerEvent::Message(record("m1", "t1"))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_counts_as_failed_delivery() {
        let relay = relay_with_thread("t1", "alice", 1);
        let (a, _rx) = relay.connect(UserId::new("alice")).await.unwrap();

        // JoinedThread ack fills the single slot
        relay.handle_event(a, ClientEvent::JoinThread(thread("t1"))).await;

        let report = relay.publish(&thread("t1"), record("m1", "t1")).await;
        assert_eq!(report, EmitReport { delivered: 0, failed: 1 });
    }

    #[tokio::test]
    async fn disconnect_closes_queue_and_is_idempotent() {
        let relay = relay_with_thread("t1", "alice", 8);
        let (a, mut rx) = relay.connect(UserId::new("alice")).await.unwrap();
        relay.handle_event(a, ClientEvent::JoinThread(thread("t1"))).await;
        let _ = rx.recv().await;

        relay.disconnect(a, "test").await;
        relay.disconnect(a, "test again").await;

        assert_eq!(rx.recv().await, None);
        assert!(!relay.is_member(a, &thread("t1")).await);
        assert_eq!(relay.connection_count().await, 0);

        let report = relay.publish(&thread("t1"), record("m1", "t1")).await;
        assert_eq!(report.recipients(), 0);
    }

    #[tokio::test]
    async fn malformed_frame_answers_with_error_event() {
        let relay = relay_with_thread("t1", "alice", 8);
        let (a, mut rx) = relay.connect(UserId::new("alice")).await.unwrap();

        relay.handle_frame(a, b"not json").await;

        let event = rx.recv().await;
        assert!(
            matches!(&event, Some(ServerEvent::Error(p)) if p.code == ErrorCode::MalformedFrame),
            "expected malformed frame error, got {event:?}"
        );
    }
}
