//! Fuzz target for relay membership and fan-out
//!
//! Applies arbitrary operation sequences to the real driver (through SimRelay)
//! and to the reference model.
//!
//! # Invariants
//!
//! - Every operation has the same outcome in model and driver
//! - A publish reaches exactly the current members of the room, once each
//! - A disconnected connection is in no room

#![no_main]

use libfuzzer_sys::fuzz_target;
use threadrelay_harness::{
    ModelRelay, Operation, OperationError, OperationResult, SimRelay, model_thread_id,
    model_user_id,
    model::{NUM_THREADS, thread_owner},
};
use threadrelay_proto::{ErrorCode, MessageId, MessageRecord, ServerEvent};
use threadrelay_server::{DriverConfig, MemoryStorage, Storage, StoredThread};

fuzz_target!(|ops: Vec<Operation>| {
    let storage = MemoryStorage::new();
    for thread in 0..NUM_THREADS {
        storage
            .create_thread(&StoredThread {
                id: model_thread_id(thread),
                author_id: model_user_id(thread_owner(thread)),
                title: String::new(),
            })
            .unwrap();
    }

    let mut relay = SimRelay::new(storage, DriverConfig::default());
    let mut model = ModelRelay::new();
    let mut clients = Vec::new();
    let mut sequence = 0u32;

    for op in ops.iter().take(256) {
        let real = match *op {
            Operation::Connect { user } => {
                clients.push(relay.connect(model_user_id(user)).unwrap());
                OperationResult::Ok
            },
            Operation::Join { client_id, thread } => match clients.get(client_id as usize) {
                None => OperationResult::Error(OperationError::InvalidClient),
                Some(&conn) => match relay.join(conn, &model_thread_id(thread)) {
                    Ok(Some(ServerEvent::JoinedThread(_))) => OperationResult::Ok,
                    Ok(Some(ServerEvent::Error(p))) if p.code == ErrorCode::NotAuthorized => {
                        OperationResult::Error(OperationError::NotAuthorized)
                    },
                    Err(_) => OperationResult::Error(OperationError::NotConnected),
                    other => panic!("unexpected join outcome: {other:?}"),
                },
            },
            Operation::Leave { client_id, thread } => match clients.get(client_id as usize) {
                None => OperationResult::Error(OperationError::InvalidClient),
                Some(&conn) => match relay.leave(conn, &model_thread_id(thread)) {
                    Ok(_) => OperationResult::Ok,
                    Err(_) => OperationResult::Error(OperationError::NotConnected),
                },
            },
            Operation::Disconnect { client_id } => match clients.get(client_id as usize) {
                None => OperationResult::Error(OperationError::InvalidClient),
                Some(&conn) => {
                    relay.disconnect(conn);
                    assert_eq!(relay.driver().rooms_for_connection(conn).count(), 0);
                    OperationResult::Ok
                },
            },
            Operation::Publish { thread } => {
                let thread_id = model_thread_id(thread);
                let record = MessageRecord {
                    id: MessageId::new(format!("msg-{sequence}")),
                    thread_id: thread_id.clone(),
                    content: String::new(),
                    author_id: None,
                    created_at: u64::from(sequence),
                };
                sequence += 1;

                let report = relay.publish(&thread_id, record);
                assert_eq!(report.delivered, model.member_count(thread));
                assert_eq!(report.failed, 0);
                OperationResult::Ok
            },
        };

        assert_eq!(model.apply(op), real, "divergence on {op:?}");
    }
});
