//! Relay driver behavior tests
//!
//! Join authorization, leave semantics, teardown and limits, exercised through
//! the Sans-IO driver with a recording outbound sink.

use threadrelay_harness::RecordingOutbound;
use threadrelay_proto::{
    ClientEvent, ConnectionId, ErrorCode, MessageId, MessageRecord, ProtocolError, ServerEvent,
    ThreadId, UserId,
};
use threadrelay_server::{
    DriverConfig, DriverError, LogLevel, MemoryStorage, RelayAction, RelayDriver, RelayEvent,
    Storage, StoredThread,
};

fn thread(raw: &str) -> ThreadId {
    ThreadId::parse(raw).unwrap()
}

fn driver_with(threads: &[(&str, &str)], config: DriverConfig) -> RelayDriver<MemoryStorage> {
    let storage = MemoryStorage::new();
    for (id, owner) in threads {
        storage
            .create_thread(&StoredThread {
                id: thread(id),
                author_id: UserId::new(*owner),
                title: String::new(),
            })
            .unwrap();
    }
    RelayDriver::new(storage, config)
}

fn join(
    driver: &mut RelayDriver<MemoryStorage>,
    connection_id: ConnectionId,
    raw: &str,
) -> Vec<RelayAction> {
    driver
        .process_event(RelayEvent::ClientEventReceived {
            connection_id,
            event: ClientEvent::JoinThread(thread(raw)),
        })
        .unwrap()
}

fn sent_events(actions: &[RelayAction]) -> Vec<&ServerEvent> {
    actions
        .iter()
        .filter_map(|a| match a {
            RelayAction::SendToConnection { event, .. } => Some(event),
            RelayAction::Log { .. } => None,
        })
        .collect()
}

fn record(id: &str, thread_id: &str) -> MessageRecord {
    MessageRecord {
        id: MessageId::new(id),
        thread_id: thread(thread_id),
        content: "hello".to_string(),
        author_id: None,
        created_at: 1,
    }
}

#[test]
fn owner_join_is_acknowledged() {
    let mut driver = driver_with(&[("t1", "alice")], DriverConfig::default());
    let a = driver.connect(UserId::new("alice")).unwrap();

    let actions = join(&mut driver, a, "t1");

    assert_eq!(sent_events(&actions), vec![&ServerEvent::JoinedThread(thread("t1"))]);
    assert!(driver.is_member(a, &thread("t1")));
    assert_eq!(driver.rooms_for_connection(a).collect::<Vec<_>>(), vec![&thread("t1")]);
}

#[test]
fn join_of_foreign_or_unknown_thread_is_denied_identically() {
    let mut driver = driver_with(&[("t1", "alice")], DriverConfig::default());
    let m = driver.connect(UserId::new("mallory")).unwrap();

    for raw in ["t1", "does-not-exist"] {
        let actions = join(&mut driver, m, raw);
        let events = sent_events(&actions);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::Error(p) if p.code == ErrorCode::NotAuthorized));
        assert!(
            actions.iter().any(|a| matches!(a, RelayAction::Log { level: LogLevel::Warn, .. }))
        );
    }

    assert_eq!(driver.room_count(), 0);
}

#[test]
fn repeated_join_keeps_single_membership() {
    let mut driver = driver_with(&[("t1", "alice")], DriverConfig::default());
    let a = driver.connect(UserId::new("alice")).unwrap();

    join(&mut driver, a, "t1");
    join(&mut driver, a, "t1");

    let mut outbound = RecordingOutbound::new();
    let report = driver.publish(&thread("t1"), record("m1", "t1"), &mut outbound);
    assert_eq!(report.delivered, 1);
    assert_eq!(outbound.messages_for(a).len(), 1);
}

#[test]
fn leave_of_unjoined_room_is_silent_noop() {
    let mut driver = driver_with(&[("t1", "alice")], DriverConfig::default());
    let a = driver.connect(UserId::new("alice")).unwrap();

    let actions = driver
        .process_event(RelayEvent::ClientEventReceived {
            connection_id: a,
            event: ClientEvent::LeaveThread(thread("t1")),
        })
        .unwrap();

    assert!(actions.is_empty());
    assert_eq!(driver.room_count(), 0);
}

#[test]
fn close_removes_from_all_rooms_and_is_idempotent() {
    let mut driver = driver_with(&[("t1", "alice"), ("t2", "alice")], DriverConfig::default());
    let a = driver.connect(UserId::new("alice")).unwrap();
    let b = driver.connect(UserId::new("alice")).unwrap();
    join(&mut driver, a, "t1");
    join(&mut driver, a, "t2");
    join(&mut driver, b, "t1");

    let close = RelayEvent::ConnectionClosed { connection_id: a, reason: "peer".to_string() };
    let first = driver.process_event(close.clone()).unwrap();
    let second = driver.process_event(close).unwrap();

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert!(!driver.is_member(a, &thread("t1")));
    assert!(!driver.is_member(a, &thread("t2")));
    assert!(driver.is_member(b, &thread("t1")));
    assert_eq!(driver.members(&thread("t1")).collect::<Vec<_>>(), vec![b]);
    assert_eq!(driver.room_count(), 1);
    assert_eq!(driver.connection_count(), 1);
}

#[test]
fn events_from_closed_connection_are_rejected() {
    let mut driver = driver_with(&[("t1", "alice")], DriverConfig::default());
    let a = driver.connect(UserId::new("alice")).unwrap();
    driver
        .process_event(RelayEvent::ConnectionClosed { connection_id: a, reason: "x".to_string() })
        .unwrap();

    let result = driver.process_event(RelayEvent::ClientEventReceived {
        connection_id: a,
        event: ClientEvent::JoinThread(thread("t1")),
    });

    assert_eq!(result, Err(DriverError::ConnectionNotFound(a)));
    assert_eq!(driver.room_count(), 0);
}

#[test]
fn malformed_frame_yields_error_event() {
    let mut driver = driver_with(&[], DriverConfig::default());
    let a = driver.connect(UserId::new("alice")).unwrap();

    let actions = driver
        .process_event(RelayEvent::MalformedFrame {
            connection_id: a,
            error: ProtocolError::MalformedFrame("expected value".to_string()),
        })
        .unwrap();

    let events = sent_events(&actions);
    assert!(matches!(events[0], ServerEvent::Error(p) if p.code == ErrorCode::MalformedFrame));
}

#[test]
fn connection_limit_refuses_new_connections_only() {
    let mut driver = driver_with(&[("t1", "alice")], DriverConfig { max_connections: 2 });
    let a = driver.connect(UserId::new("alice")).unwrap();
    driver.connect(UserId::new("alice")).unwrap();

    let refused = driver.connect(UserId::new("alice"));
    assert_eq!(refused, Err(DriverError::ConnectionLimitReached { limit: 2 }));

    assert_eq!(sent_events(&join(&mut driver, a, "t1")).len(), 1);
    assert!(driver.is_member(a, &thread("t1")));
}

#[test]
fn publish_to_empty_room_is_silent() {
    let driver = driver_with(&[("t1", "alice")], DriverConfig::default());
    let mut outbound = RecordingOutbound::new();

    let report = driver.publish(&thread("t1"), record("m1", "t1"), &mut outbound);

    assert_eq!(report.recipients(), 0);
    assert_eq!(outbound.total_delivered(), 0);
}

#[test]
fn failed_delivery_does_not_stop_fanout() {
    let mut driver = driver_with(&[("t1", "alice")], DriverConfig::default());
    let a = driver.connect(UserId::new("alice")).unwrap();
    let b = driver.connect(UserId::new("alice")).unwrap();
    join(&mut driver, a, "t1");
    join(&mut driver, b, "t1");

    let mut outbound = RecordingOutbound::new();
    outbound.mark_gone(a);
    let report = driver.publish(&thread("t1"), record("m1", "t1"), &mut outbound);

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(outbound.messages_for(b).len(), 1);
}
