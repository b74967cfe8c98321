//! Relay driver.
//!
//! Ties together the [`ConnectionRegistry`] (connection → rooms), the
//! [`RoomBroadcaster`] (room → connections) and the storage collaborator used
//! to authorize joins. The driver performs no I/O: inbound events go in,
//! actions come out, and the runtime (production or simulation) executes them.
//!
//! # Invariants
//!
//! - A connection is a member of room R iff its last join/leave for R was an
//!   admitted join and it has not disconnected since.
//! - Registry and broadcaster are only mutated together, from this module.

use threadrelay_proto::{
    ClientEvent, ConnectionId, ErrorPayload, MessageRecord, ProtocolError, ServerEvent, ThreadId,
    UserId,
};

use crate::{
    broadcaster::{EmitReport, Outbound, RoomBroadcaster},
    registry::ConnectionRegistry,
    server_error::DriverError,
    storage::Storage,
};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events that the relay driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A client event was decoded from a connection
    ClientEventReceived {
        /// Connection that sent the event
        connection_id: ConnectionId,
        /// The decoded event
        event: ClientEvent,
    },

    /// A frame from a connection could not be decoded
    MalformedFrame {
        /// Connection that sent the frame
        connection_id: ConnectionId,
        /// Decode failure
        error: ProtocolError,
    },

    /// A connection was closed (by peer, transport drop, or server)
    ConnectionClosed {
        /// Connection that was closed
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },
}

/// Actions that the relay driver produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Send an event to a specific connection
    SendToConnection {
        /// Target connection
        connection_id: ConnectionId,
        /// Event to send
        event: ServerEvent,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for driver actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based relay driver.
pub struct RelayDriver<S: Storage> {
    /// Connection → rooms
    registry: ConnectionRegistry,
    /// Room → connections
    broadcaster: RoomBroadcaster,
    /// Thread ownership lookups for join authorization
    storage: S,
    /// Driver configuration
    config: DriverConfig,
}

impl<S: Storage> RelayDriver<S> {
    /// Create a new relay driver.
    pub fn new(storage: S, config: DriverConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            broadcaster: RoomBroadcaster::new(),
            storage,
            config,
        }
    }

    /// Register a new connection for an authenticated user.
    pub fn connect(&mut self, user_id: UserId) -> Result<ConnectionId, DriverError> {
        if self.registry.connection_count() >= self.config.max_connections {
            return Err(DriverError::ConnectionLimitReached { limit: self.config.max_connections });
        }

        Ok(self.registry.on_connect(user_id))
    }

    /// Process a relay event and return actions to execute.
    ///
    /// This is the main entry point for connection-originated events.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, DriverError> {
        match event {
            RelayEvent::ClientEventReceived { connection_id, event } => match event {
                ClientEvent::JoinThread(thread_id) => self.handle_join(connection_id, thread_id),
                ClientEvent::LeaveThread(thread_id) => self.handle_leave(connection_id, &thread_id),
            },
            RelayEvent::MalformedFrame { connection_id, error } => {
                self.handle_malformed_frame(connection_id, &error)
            },
            RelayEvent::ConnectionClosed { connection_id, reason } => {
                Ok(self.handle_connection_closed(connection_id, &reason))
            },
        }
    }

    /// Fan a persisted message out to every current member of `thread_id`.
    ///
    /// Never fails; an empty room is a silent no-op.
    pub fn publish<O: Outbound>(
        &self,
        thread_id: &ThreadId,
        message: MessageRecord,
        outbound: &mut O,
    ) -> EmitReport {
        self.broadcaster.emit(thread_id, &ServerEvent::Message(message), outbound)
    }

    /// Handle a join request.
    ///
    /// The join is admitted only when the connection's authenticated identity
    /// owns the thread, the same rule the HTTP read path applies. Unknown
    /// threads and foreign threads are indistinguishable to the client.
    fn handle_join(
        &mut self,
        connection_id: ConnectionId,
        thread_id: ThreadId,
    ) -> Result<Vec<RelayAction>, DriverError> {
        let user_id = self
            .registry
            .identity(connection_id)
            .cloned()
            .ok_or(DriverError::ConnectionNotFound(connection_id))?;

        let thread = match self.storage.find_thread(&thread_id) {
            Ok(thread) => thread,
            Err(e) => {
                return Ok(vec![
                    RelayAction::SendToConnection {
                        connection_id,
                        event: ServerEvent::Error(ErrorPayload::storage_unavailable(
                            thread_id.clone(),
                            "thread lookup failed",
                        )),
                    },
                    RelayAction::Log {
                        level: LogLevel::Error,
                        message: format!(
                            "thread lookup for join of {thread_id} by {connection_id} failed: {e}"
                        ),
                    },
                ]);
            },
        };

        if !thread.is_some_and(|t| t.is_owned_by(&user_id)) {
            return Ok(vec![
                RelayAction::SendToConnection {
                    connection_id,
                    event: ServerEvent::Error(ErrorPayload::not_authorized(thread_id.clone())),
                },
                RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "{connection_id} (user {user_id}) denied join of thread {thread_id}"
                    ),
                },
            ]);
        }

        self.broadcaster.join(connection_id, &thread_id);
        self.registry.record_join(connection_id, &thread_id);

        Ok(vec![
            RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("{connection_id} (user {user_id}) joined thread {thread_id}"),
            },
            RelayAction::SendToConnection {
                connection_id,
                event: ServerEvent::JoinedThread(thread_id),
            },
        ])
    }

    /// Handle a leave request. Leaving a room the connection is not in is a
    /// no-op.
    fn handle_leave(
        &mut self,
        connection_id: ConnectionId,
        thread_id: &ThreadId,
    ) -> Result<Vec<RelayAction>, DriverError> {
        if !self.registry.has_connection(connection_id) {
            return Err(DriverError::ConnectionNotFound(connection_id));
        }

        let was_member = self.broadcaster.leave(connection_id, thread_id);
        self.registry.record_leave(connection_id, thread_id);

        if !was_member {
            return Ok(Vec::new());
        }

        Ok(vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("{connection_id} left thread {thread_id}"),
        }])
    }

    fn handle_malformed_frame(
        &mut self,
        connection_id: ConnectionId,
        error: &ProtocolError,
    ) -> Result<Vec<RelayAction>, DriverError> {
        if !self.registry.has_connection(connection_id) {
            return Err(DriverError::ConnectionNotFound(connection_id));
        }

        Ok(vec![
            RelayAction::SendToConnection {
                connection_id,
                event: ServerEvent::Error(ErrorPayload::from_protocol_error(error)),
            },
            RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("rejected frame from {connection_id}: {error}"),
            },
        ])
    }

    /// Remove a connection from every room in one pass.
    ///
    /// Idempotent: closing an unknown connection produces no actions.
    fn handle_connection_closed(
        &mut self,
        connection_id: ConnectionId,
        reason: &str,
    ) -> Vec<RelayAction> {
        let Some(rooms) = self.registry.on_disconnect(connection_id) else {
            return Vec::new();
        };

        for room in &rooms {
            self.broadcaster.leave(connection_id, room);
        }

        vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("{connection_id} closed ({reason}), left {} rooms", rooms.len()),
        }]
    }

    /// Check if a connection is a member of a thread's room.
    pub fn is_member(&self, connection_id: ConnectionId, thread_id: &ThreadId) -> bool {
        self.broadcaster.is_member(connection_id, thread_id)
    }

    /// Current members of a thread's room.
    pub fn members(&self, thread_id: &ThreadId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.broadcaster.members(thread_id)
    }

    /// All rooms a connection has joined.
    pub fn rooms_for_connection(
        &self,
        connection_id: ConnectionId,
    ) -> impl Iterator<Item = &ThreadId> + '_ {
        self.registry.rooms_for_connection(connection_id)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.broadcaster.room_count()
    }

    /// Storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }
}
