//! Synchronous relay for simulation.
//!
//! Drives the real [`RelayDriver`] and executes its actions against a
//! [`RecordingOutbound`] instead of sockets. Same semantics as the production
//! `Relay`, without the async mutex.

use threadrelay_proto::{ClientEvent, ConnectionId, MessageRecord, ServerEvent, ThreadId, UserId};
use threadrelay_server::{
    DriverConfig, DriverError, EmitReport, LogLevel, MemoryStorage, Outbound, RelayAction,
    RelayDriver, RelayEvent, Storage,
};

use crate::recording::RecordingOutbound;

/// Relay driver plus a recording outbound sink.
pub struct SimRelay<S: Storage = MemoryStorage> {
    driver: RelayDriver<S>,
    outbound: RecordingOutbound,
}

impl<S: Storage> SimRelay<S> {
    /// Create a simulated relay over `storage`.
    pub fn new(storage: S, config: DriverConfig) -> Self {
        Self { driver: RelayDriver::new(storage, config), outbound: RecordingOutbound::new() }
    }

    /// Register a connection for `user_id`.
    pub fn connect(&mut self, user_id: UserId) -> Result<ConnectionId, DriverError> {
        self.driver.connect(user_id)
    }

    /// Send a join request and return the reply event, if any.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        thread_id: &ThreadId,
    ) -> Result<Option<ServerEvent>, DriverError> {
        self.client_event(connection_id, ClientEvent::JoinThread(thread_id.clone()))
    }

    /// Send a leave request.
    pub fn leave(
        &mut self,
        connection_id: ConnectionId,
        thread_id: &ThreadId,
    ) -> Result<Option<ServerEvent>, DriverError> {
        self.client_event(connection_id, ClientEvent::LeaveThread(thread_id.clone()))
    }

    /// Feed a raw inbound frame and return the reply event, if any.
    pub fn send_frame(
        &mut self,
        connection_id: ConnectionId,
        frame: &[u8],
    ) -> Result<Option<ServerEvent>, DriverError> {
        let event = match ClientEvent::decode(frame) {
            Ok(event) => RelayEvent::ClientEventReceived { connection_id, event },
            Err(error) => RelayEvent::MalformedFrame { connection_id, error },
        };
        self.process(event)
    }

    /// Tear a connection down. Later deliveries to it fail.
    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        self.outbound.mark_gone(connection_id);
        // closing is idempotent and never errors
        let _ = self.process(RelayEvent::ConnectionClosed {
            connection_id,
            reason: "simulated disconnect".to_string(),
        });
    }

    /// Fan a message out to the thread's room.
    pub fn publish(&mut self, thread_id: &ThreadId, message: MessageRecord) -> EmitReport {
        self.driver.publish(thread_id, message, &mut self.outbound)
    }

    /// Everything delivered so far.
    pub fn outbound(&self) -> &RecordingOutbound {
        &self.outbound
    }

    /// Underlying driver, for membership queries.
    pub fn driver(&self) -> &RelayDriver<S> {
        &self.driver
    }

    fn client_event(
        &mut self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<Option<ServerEvent>, DriverError> {
        self.process(RelayEvent::ClientEventReceived { connection_id, event })
    }

    /// Process an event, execute its actions and return the last event sent
    /// back to the originating connection.
    fn process(&mut self, event: RelayEvent) -> Result<Option<ServerEvent>, DriverError> {
        let actions = self.driver.process_event(event)?;

        let mut reply = None;
        for action in actions {
            match action {
                RelayAction::SendToConnection { connection_id, event } => {
                    if let Err(e) = self.outbound.deliver(connection_id, &event) {
                        tracing::debug!("simulated delivery failed: {}", e);
                    }
                    reply = Some(event);
                },
                RelayAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }
        Ok(reply)
    }
}
