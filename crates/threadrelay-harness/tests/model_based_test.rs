//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! relay driver behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelRelay      RealWorld       Compare
//!      (reference)     (SimRelay)      Results
//! ```

use proptest::prelude::*;
use threadrelay_harness::{
    ClientId, ModelRelay, ModelThreadId, ObservableState, Operation, OperationError,
    OperationResult, SimRelay, model_thread_id, model_user_id,
    model::{NUM_THREADS, thread_owner},
};
use threadrelay_proto::{ConnectionId, ErrorCode, MessageId, MessageRecord, ServerEvent};
use threadrelay_server::{DriverConfig, DriverError, MemoryStorage, Storage, StoredThread};

/// Real system wrapper that mirrors ModelRelay's interface.
struct RealWorld {
    relay: SimRelay<MemoryStorage>,
    clients: Vec<ConnectionId>,
    next_sequence: u32,
}

impl RealWorld {
    fn new() -> Self {
        let storage = MemoryStorage::new();
        for thread in 0..NUM_THREADS {
            storage
                .create_thread(&StoredThread {
                    id: model_thread_id(thread),
                    author_id: model_user_id(thread_owner(thread)),
                    title: format!("Thread {thread}"),
                })
                .unwrap();
        }

        Self {
            relay: SimRelay::new(storage, DriverConfig::default()),
            clients: Vec::new(),
            next_sequence: 0,
        }
    }

    fn client(&self, client_id: ClientId) -> Result<ConnectionId, OperationError> {
        self.clients.get(client_id as usize).copied().ok_or(OperationError::InvalidClient)
    }

    fn apply(&mut self, op: &Operation) -> OperationResult {
        match *op {
            Operation::Connect { user } => {
                let conn = self.relay.connect(model_user_id(user)).unwrap();
                self.clients.push(conn);
                OperationResult::Ok
            },
            Operation::Join { client_id, thread } => {
                let conn = match self.client(client_id) {
                    Ok(conn) => conn,
                    Err(e) => return OperationResult::Error(e),
                };
                match self.relay.join(conn, &model_thread_id(thread)) {
                    Ok(Some(ServerEvent::JoinedThread(_))) => OperationResult::Ok,
                    Ok(Some(ServerEvent::Error(p))) if p.code == ErrorCode::NotAuthorized => {
                        OperationResult::Error(OperationError::NotAuthorized)
                    },
                    Err(DriverError::ConnectionNotFound(_)) => {
                        OperationResult::Error(OperationError::NotConnected)
                    },
                    other => panic!("unexpected join outcome: {other:?}"),
                }
            },
            Operation::Leave { client_id, thread } => {
                let conn = match self.client(client_id) {
                    Ok(conn) => conn,
                    Err(e) => return OperationResult::Error(e),
                };
                match self.relay.leave(conn, &model_thread_id(thread)) {
                    Ok(None) => OperationResult::Ok,
                    Err(DriverError::ConnectionNotFound(_)) => {
                        OperationResult::Error(OperationError::NotConnected)
                    },
                    other => panic!("unexpected leave outcome: {other:?}"),
                }
            },
            Operation::Disconnect { client_id } => match self.client(client_id) {
                Ok(conn) => {
                    self.relay.disconnect(conn);
                    OperationResult::Ok
                },
                Err(e) => OperationResult::Error(e),
            },
            Operation::Publish { thread } => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;

                let thread_id = model_thread_id(thread);
                let record = MessageRecord {
                    id: MessageId::new(format!("msg-{sequence}")),
                    thread_id: thread_id.clone(),
                    content: format!("message {sequence}"),
                    author_id: None,
                    created_at: u64::from(sequence),
                };
                let report = self.relay.publish(&thread_id, record);
                assert_eq!(report.failed, 0, "no live member may fail delivery");
                OperationResult::Ok
            },
        }
    }

    fn observable_state(&self) -> ObservableState {
        let memberships = self
            .clients
            .iter()
            .map(|&conn| {
                let mut threads: Vec<ModelThreadId> = self
                    .relay
                    .driver()
                    .rooms_for_connection(conn)
                    .map(|t| parse_thread(t.as_str()))
                    .collect();
                threads.sort_unstable();
                threads
            })
            .collect();

        let deliveries = self
            .clients
            .iter()
            .map(|&conn| {
                self.relay
                    .outbound()
                    .messages_for(conn)
                    .into_iter()
                    .map(|m| (parse_thread(m.thread_id.as_str()), parse_sequence(&m.id.0)))
                    .collect()
            })
            .collect();

        ObservableState { memberships, deliveries }
    }
}

fn parse_thread(raw: &str) -> ModelThreadId {
    raw.strip_prefix("thread-").and_then(|n| n.parse().ok()).unwrap()
}

fn parse_sequence(raw: &str) -> u32 {
    raw.strip_prefix("msg-").and_then(|n| n.parse().ok()).unwrap()
}

/// Strategy for generating operations.
fn operation_strategy(max_clients: u8) -> impl Strategy<Value = Operation> {
    let client_id = 0..max_clients;
    let thread = 0..NUM_THREADS;

    prop_oneof![
        2 => any::<u8>().prop_map(|user| Operation::Connect { user }),
        4 => (client_id.clone(), thread.clone())
            .prop_map(|(client_id, thread)| Operation::Join { client_id, thread }),
        1 => (client_id.clone(), thread.clone())
            .prop_map(|(client_id, thread)| Operation::Leave { client_id, thread }),
        1 => client_id.prop_map(|client_id| Operation::Disconnect { client_id }),
        3 => thread.prop_map(|thread| Operation::Publish { thread }),
    ]
}

proptest! {
    /// Operation results and final observable state match the model.
    #[test]
    fn prop_model_matches_real(ops in prop::collection::vec(operation_strategy(6), 0..80)) {
        let mut model = ModelRelay::new();
        let mut real = RealWorld::new();

        for (i, op) in ops.iter().enumerate() {
            let model_result = model.apply(op);
            let real_result = real.apply(op);

            prop_assert_eq!(
                &model_result,
                &real_result,
                "Divergence at operation {}: {:?}",
                i, op
            );
        }

        prop_assert_eq!(model.observable_state(), real.observable_state());
    }

    /// Every live member of a room receives each publish exactly once.
    #[test]
    fn prop_publish_reaches_each_member_once(
        ops in prop::collection::vec(operation_strategy(6), 0..60),
    ) {
        let mut model = ModelRelay::new();
        let mut real = RealWorld::new();

        for op in &ops {
            if let Operation::Publish { thread } = *op {
                let before = real.relay.outbound().total_delivered();
                let expected = model.member_count(thread);
                model.apply(op);
                real.apply(op);
                prop_assert_eq!(real.relay.outbound().total_delivered() - before, expected);
            } else {
                model.apply(op);
                real.apply(op);
            }
        }

        prop_assert_eq!(model.client_count(), real.clients.len());
    }
}
