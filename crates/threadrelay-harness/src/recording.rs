//! Recording implementations of the relay's output seams.

#![allow(clippy::disallowed_types, reason = "Synchronous recording state")]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use threadrelay_proto::{ConnectionId, MessageRecord, ServerEvent, ThreadId};
use threadrelay_server::{DeliveryError, EmitReport, Outbound, Publisher};

/// Outbound sink that records every delivered event per connection.
///
/// Connections marked gone reject deliveries the way a closed socket queue
/// does.
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    delivered: HashMap<ConnectionId, Vec<ServerEvent>>,
    gone: HashSet<ConnectionId>,
}

impl RecordingOutbound {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later delivery to `connection_id` fail.
    pub fn mark_gone(&mut self, connection_id: ConnectionId) {
        self.gone.insert(connection_id);
    }

    /// Events delivered to a connection, in delivery order.
    pub fn events_for(&self, connection_id: ConnectionId) -> &[ServerEvent] {
        self.delivered.get(&connection_id).map_or(&[], Vec::as_slice)
    }

    /// Message records delivered to a connection, in delivery order.
    pub fn messages_for(&self, connection_id: ConnectionId) -> Vec<&MessageRecord> {
        self.events_for(connection_id)
            .iter()
            .filter_map(|e| match e {
                ServerEvent::Message(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// The most recent event delivered to a connection.
    pub fn last_event(&self, connection_id: ConnectionId) -> Option<&ServerEvent> {
        self.events_for(connection_id).last()
    }

    /// Total number of delivered events across all connections.
    pub fn total_delivered(&self) -> usize {
        self.delivered.values().map(Vec::len).sum()
    }
}

impl Outbound for RecordingOutbound {
    fn deliver(
        &mut self,
        connection_id: ConnectionId,
        event: &ServerEvent,
    ) -> Result<(), DeliveryError> {
        if self.gone.contains(&connection_id) {
            return Err(DeliveryError::ConnectionGone(connection_id));
        }

        self.delivered.entry(connection_id).or_default().push(event.clone());
        Ok(())
    }
}

/// Publisher that records every publish call instead of fanning out.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(ThreadId, MessageRecord)>>>,
}

impl RecordingPublisher {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All publish calls so far, in call order.
    #[allow(clippy::expect_used)]
    pub fn published(&self) -> Vec<(ThreadId, MessageRecord)> {
        self.published.lock().expect("RecordingPublisher poisoned").clone()
    }

    /// Number of publish calls so far.
    #[allow(clippy::expect_used)]
    pub fn publish_count(&self) -> usize {
        self.published.lock().expect("RecordingPublisher poisoned").len()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    #[allow(clippy::expect_used)]
    async fn publish(&self, thread_id: &ThreadId, message: MessageRecord) -> EmitReport {
        self.published
            .lock()
            .expect("RecordingPublisher poisoned")
            .push((thread_id.clone(), message));
        EmitReport::default()
    }
}
