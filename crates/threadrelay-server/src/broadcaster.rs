//! Room broadcaster.
//!
//! Maps each room (thread id) to the set of connections currently subscribed
//! and fans events out to them. Rooms are created implicitly by the first join
//! and dropped as soon as their last member leaves.
//!
//! Delivery goes through the [`Outbound`] trait so the same fan-out logic runs
//! against real per-connection queues in production and a recording sink in
//! simulation. A failed delivery to one member never stops delivery to the
//! rest.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use threadrelay_proto::{ConnectionId, ServerEvent, ThreadId};

/// Why a single delivery failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// No outbound queue for the connection (mid-teardown or already gone)
    #[error("connection {0} is gone")]
    ConnectionGone(ConnectionId),

    /// The connection's outbound queue is full (client too slow)
    #[error("outbound queue full for connection {0}")]
    QueueFull(ConnectionId),
}

/// Per-connection outbound delivery.
///
/// Implementations must not block: delivery is fire-and-forget.
pub trait Outbound {
    /// Hand `event` to the connection's outbound channel.
    fn deliver(&mut self, connection_id: ConnectionId, event: &ServerEvent)
    -> Result<(), DeliveryError>;
}

/// Outcome of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Members the event was handed to
    pub delivered: usize,
    /// Members whose delivery failed
    pub failed: usize,
}

impl EmitReport {
    /// Number of members at the moment of emission.
    pub fn recipients(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Room membership and fan-out.
#[derive(Debug, Default)]
pub struct RoomBroadcaster {
    /// Room ID → member connection IDs
    rooms: HashMap<ThreadId, HashSet<ConnectionId>>,
}

impl RoomBroadcaster {
    /// Create a broadcaster with no rooms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Returns `true` if the connection was not already a member.
    pub fn join(&mut self, connection_id: ConnectionId, room: &ThreadId) -> bool {
        self.rooms.entry(room.clone()).or_default().insert(connection_id)
    }

    /// Remove a connection from a room.
    ///
    /// Returns `true` if the connection was a member. Empty rooms are removed.
    pub fn leave(&mut self, connection_id: ConnectionId, room: &ThreadId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };

        let removed = members.remove(&connection_id);
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }

    /// Deliver `event` to every current member of `room`.
    ///
    /// A room with no members is a silent no-op. Per-member failures are
    /// logged and counted, never propagated.
    pub fn emit<O: Outbound>(
        &self,
        room: &ThreadId,
        event: &ServerEvent,
        outbound: &mut O,
    ) -> EmitReport {
        let mut report = EmitReport::default();

        let Some(members) = self.rooms.get(room) else {
            tracing::trace!(%room, "emit to empty room");
            return report;
        };

        for &connection_id in members {
            match outbound.deliver(connection_id, event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(%room, %connection_id, "delivery failed: {}", e);
                },
            }
        }

        report
    }

    /// Check if a connection is a member of a room.
    pub fn is_member(&self, connection_id: ConnectionId, room: &ThreadId) -> bool {
        self.rooms.get(room).is_some_and(|m| m.contains(&connection_id))
    }

    /// Current members of a room.
    pub fn members(&self, room: &ThreadId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.rooms.get(room).into_iter().flat_map(|m| m.iter().copied())
    }

    /// Number of members in a room.
    pub fn member_count(&self, room: &ThreadId) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use threadrelay_proto::ErrorPayload;

    use super::*;

    /// Records deliveries; connections listed in `gone` fail.
    #[derive(Default)]
    struct Recorder {
        delivered: Vec<ConnectionId>,
        gone: HashSet<ConnectionId>,
    }

    impl Outbound for Recorder {
        fn deliver(
            &mut self,
            connection_id: ConnectionId,
            _event: &ServerEvent,
        ) -> Result<(), DeliveryError> {
            if self.gone.contains(&connection_id) {
                return Err(DeliveryError::ConnectionGone(connection_id));
            }
            self.delivered.push(connection_id);
            Ok(())
        }
    }

    fn room(raw: &str) -> ThreadId {
        ThreadId::parse(raw).unwrap()
    }

    fn event() -> ServerEvent {
        ServerEvent::Error(ErrorPayload::not_authorized(room("x")))
    }

    #[test]
    fn join_is_idempotent() {
        let mut broadcaster = RoomBroadcaster::new();

        assert!(broadcaster.join(ConnectionId(1), &room("t1")));
        assert!(!broadcaster.join(ConnectionId(1), &room("t1")));
        assert_eq!(broadcaster.member_count(&room("t1")), 1);
    }

    #[test]
    fn leave_absent_member_is_noop() {
        let mut broadcaster = RoomBroadcaster::new();

        assert!(!broadcaster.leave(ConnectionId(1), &room("t1")));

        broadcaster.join(ConnectionId(2), &room("t1"));
        assert!(!broadcaster.leave(ConnectionId(1), &room("t1")));
        assert_eq!(broadcaster.member_count(&room("t1")), 1);
    }

    #[test]
    fn empty_rooms_are_removed() {
        let mut broadcaster = RoomBroadcaster::new();

        broadcaster.join(ConnectionId(1), &room("t1"));
        assert_eq!(broadcaster.room_count(), 1);

        assert!(broadcaster.leave(ConnectionId(1), &room("t1")));
        assert_eq!(broadcaster.room_count(), 0);
    }

    #[test]
    fn emit_reaches_only_room_members() {
        let mut broadcaster = RoomBroadcaster::new();
        broadcaster.join(ConnectionId(1), &room("t1"));
        broadcaster.join(ConnectionId(2), &room("t1"));
        broadcaster.join(ConnectionId(3), &room("t2"));

        let mut recorder = Recorder::default();
        let report = broadcaster.emit(&room("t1"), &event(), &mut recorder);

        assert_eq!(report, EmitReport { delivered: 2, failed: 0 });
        recorder.delivered.sort();
        assert_eq!(recorder.delivered, vec![ConnectionId(1), ConnectionId(2)]);
    }

    #[test]
    fn emit_to_empty_room_is_silent() {
        let broadcaster = RoomBroadcaster::new();
        let mut recorder = Recorder::default();

        let report = broadcaster.emit(&room("nobody"), &event(), &mut recorder);
        assert_eq!(report, EmitReport::default());
        assert!(recorder.delivered.is_empty());
    }

    #[test]
    fn emit_continues_past_failed_member() {
        let mut broadcaster = RoomBroadcaster::new();
        for id in 1..=4 {
            broadcaster.join(ConnectionId(id), &room("t1"));
        }

        let mut recorder = Recorder::default();
        recorder.gone.insert(ConnectionId(2));
        recorder.gone.insert(ConnectionId(3));

        let report = broadcaster.emit(&room("t1"), &event(), &mut recorder);
        assert_eq!(report, EmitReport { delivered: 2, failed: 2 });
        assert_eq!(report.recipients(), 4);
    }
}
