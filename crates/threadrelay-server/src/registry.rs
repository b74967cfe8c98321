//! Connection registry.
//!
//! Tracks every live connection, the identity it authenticated with, and the
//! rooms it has joined (connection → rooms). The reverse direction (room →
//! connections) lives in the [`RoomBroadcaster`](crate::RoomBroadcaster);
//! the driver updates both sides together so that disconnect cleanup can find
//! every room in one lookup.

use std::collections::{HashMap, HashSet};

use threadrelay_proto::{ConnectionId, ThreadId, UserId};

/// Information about a registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// User the connection authenticated as during the upgrade
    pub user_id: UserId,
    /// Rooms this connection is currently a member of
    pub rooms: HashSet<ThreadId>,
}

/// Registry for tracking live connections and their joined rooms.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection ID → connection info
    connections: HashMap<ConnectionId, ConnectionInfo>,
    /// Next connection ID to hand out. IDs are never reused
    next_id: u64,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with empty room membership.
    pub fn on_connect(&mut self, user_id: UserId) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);

        self.connections.insert(id, ConnectionInfo { user_id, rooms: HashSet::new() });
        id
    }

    /// Remove a connection and return the rooms it was in.
    ///
    /// Returns `None` if the connection was already removed (or never
    /// existed), which makes repeated disconnects a no-op.
    pub fn on_disconnect(&mut self, id: ConnectionId) -> Option<HashSet<ThreadId>> {
        self.connections.remove(&id).map(|info| info.rooms)
    }

    /// Record that a connection joined a room.
    ///
    /// Returns `false` if the connection is not registered.
    pub fn record_join(&mut self, id: ConnectionId, room: &ThreadId) -> bool {
        match self.connections.get_mut(&id) {
            Some(info) => {
                info.rooms.insert(room.clone());
                true
            },
            None => false,
        }
    }

    /// Record that a connection left a room.
    ///
    /// Returns `true` if the connection was in the room.
    pub fn record_leave(&mut self, id: ConnectionId, room: &ThreadId) -> bool {
        self.connections.get_mut(&id).is_some_and(|info| info.rooms.remove(room))
    }

    /// Identity of a connection. `None` if connection doesn't exist.
    pub fn identity(&self, id: ConnectionId) -> Option<&UserId> {
        self.connections.get(&id).map(|info| &info.user_id)
    }

    /// Check if a connection is registered.
    pub fn has_connection(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// All rooms a connection has joined.
    pub fn rooms_for_connection(&self, id: ConnectionId) -> impl Iterator<Item = &ThreadId> + '_ {
        self.connections.get(&id).into_iter().flat_map(|info| info.rooms.iter())
    }

    /// Total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(raw: &str) -> ThreadId {
        ThreadId::parse(raw).unwrap()
    }

    #[test]
    fn connect_allocates_distinct_ids() {
        let mut registry = ConnectionRegistry::new();

        let a = registry.on_connect(UserId::new("alice"));
        let b = registry.on_connect(UserId::new("alice"));

        assert_ne!(a, b);
        assert!(registry.has_connection(a));
        assert!(registry.has_connection(b));
        assert_eq!(registry.identity(a), Some(&UserId::new("alice")));
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn ids_are_not_reused_after_disconnect() {
        let mut registry = ConnectionRegistry::new();

        let a = registry.on_connect(UserId::new("alice"));
        registry.on_disconnect(a);
        let b = registry.on_connect(UserId::new("alice"));

        assert_ne!(a, b);
    }

    #[test]
    fn disconnect_returns_joined_rooms() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.on_connect(UserId::new("alice"));

        assert!(registry.record_join(id, &room("t1")));
        assert!(registry.record_join(id, &room("t2")));

        let rooms = registry.on_disconnect(id).unwrap();
        assert_eq!(rooms.len(), 2);
        assert!(rooms.contains(&room("t1")));
        assert!(rooms.contains(&room("t2")));
        assert!(!registry.has_connection(id));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.on_connect(UserId::new("alice"));

        assert!(registry.on_disconnect(id).is_some());
        assert!(registry.on_disconnect(id).is_none());
        assert!(registry.on_disconnect(ConnectionId(999)).is_none());
    }

    #[test]
    fn join_unregistered_connection_fails() {
        let mut registry = ConnectionRegistry::new();
        assert!(!registry.record_join(ConnectionId(42), &room("t1")));
    }

    #[test]
    fn leave_reports_prior_membership() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.on_connect(UserId::new("alice"));

        registry.record_join(id, &room("t1"));
        assert!(registry.record_leave(id, &room("t1")));
        assert!(!registry.record_leave(id, &room("t1")));
        assert_eq!(registry.rooms_for_connection(id).count(), 0);
    }
}
