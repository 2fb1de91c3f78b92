use bytes::Bytes;
use courier::commands::{
    Command, CommandPayload, ConnectionId, ConnectionInfo, ConsumerId, ConsumerInfo, Destination,
    DestinationInfo, Message, MessageId, MessagePull, ProducerId, ProducerInfo, ResponseBody,
    SessionId, SessionInfo, TransactionId, TransactionInfo, TransactionPhase,
};
use courier::state::{ConnectionStateTracker, TrackerConfig};
use courier::transport::MockTransport;

/// Opt into restore-walk logs with RUST_LOG=courier=debug.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn track(tracker: &ConnectionStateTracker, payload: CommandPayload) {
    tracker.track(&Command::new(payload)).unwrap();
}

fn seeded_tracker() -> (ConnectionStateTracker, ConnectionId, SessionId) {
    let tracker = ConnectionStateTracker::new(TrackerConfig::default().with_track_transactions(true));
    let connection_id = ConnectionId::new("conn");
    let session_id = SessionId::new(&connection_id, 1);

    track(
        &tracker,
        CommandPayload::ConnectionInfo(ConnectionInfo::new(connection_id.clone())),
    );
    track(
        &tracker,
        CommandPayload::SessionInfo(SessionInfo::new(session_id.clone())),
    );
    (tracker, connection_id, session_id)
}

fn payload_kinds(commands: &[Command]) -> Vec<&'static str> {
    commands
        .iter()
        .map(|command| match &command.payload {
            CommandPayload::ConnectionInfo(_) => "connection",
            CommandPayload::SessionInfo(_) => "session",
            CommandPayload::ProducerInfo(_) => "producer",
            CommandPayload::ConsumerInfo(_) => "consumer",
            CommandPayload::DestinationInfo(_) => "destination",
            CommandPayload::RemoveProducer(_) => "remove-producer",
            CommandPayload::Transaction(_) => "transaction",
            CommandPayload::Message(_) => "message",
            CommandPayload::MessagePull(_) => "pull",
            CommandPayload::ConsumerControl(_) => "control",
            _ => "other",
        })
        .collect()
}

#[test]
fn restore_replays_the_full_hierarchy_in_order() {
    init_tracing();
    let (tracker, connection_id, session_id) = seeded_tracker();

    track(
        &tracker,
        CommandPayload::DestinationInfo(DestinationInfo {
            connection_id: connection_id.clone(),
            destination: Destination::temp_queue("replies"),
        }),
    );
    track(
        &tracker,
        CommandPayload::ProducerInfo(ProducerInfo::new(ProducerId::new(&session_id, 1))),
    );
    track(
        &tracker,
        CommandPayload::ConsumerInfo(ConsumerInfo::new(
            ConsumerId::new(&session_id, 1),
            Destination::queue("orders"),
        )),
    );

    let transport = MockTransport::new();
    let in_doubt = tracker.restore(&transport).unwrap();
    assert!(in_doubt.is_empty());

    let sent = transport.take_commands();
    let kinds = payload_kinds(&sent);

    // Connection first, then its temp destinations, then sessions with their
    // producers and consumers.
    assert_eq!(kinds[0], "connection");
    assert_eq!(kinds[1], "destination");

    let connection_info = match &sent[0].payload {
        CommandPayload::ConnectionInfo(info) => info,
        other => panic!("expected connection info, got {other:?}"),
    };
    assert!(connection_info.failover_reconnect);

    // Both the default session and the user session are replayed.
    assert_eq!(kinds.iter().filter(|kind| **kind == "session").count(), 2);
    assert_eq!(kinds.iter().filter(|kind| **kind == "producer").count(), 1);
    assert_eq!(kinds.iter().filter(|kind| **kind == "consumer").count(), 1);

    let session_position = kinds.iter().position(|kind| *kind == "session").unwrap();
    let producer_position = kinds.iter().position(|kind| *kind == "producer").unwrap();
    assert!(session_position < producer_position);
}

#[test]
fn restore_honors_disabled_toggles() {
    let mut config = TrackerConfig::default();
    config.restore_consumers = false;
    let tracker = ConnectionStateTracker::new(config);

    let connection_id = ConnectionId::new("conn");
    let session_id = SessionId::new(&connection_id, 1);
    track(
        &tracker,
        CommandPayload::ConnectionInfo(ConnectionInfo::new(connection_id)),
    );
    track(
        &tracker,
        CommandPayload::SessionInfo(SessionInfo::new(session_id.clone())),
    );
    track(
        &tracker,
        CommandPayload::ConsumerInfo(ConsumerInfo::new(
            ConsumerId::new(&session_id, 1),
            Destination::queue("orders"),
        )),
    );

    let transport = MockTransport::new();
    tracker.restore(&transport).unwrap();
    let kinds = payload_kinds(&transport.take_commands());
    assert!(!kinds.contains(&"consumer"));
}

#[test]
fn restore_replays_cached_messages_and_pulls_last() {
    let (tracker, _connection_id, session_id) = seeded_tracker();
    let producer_id = ProducerId::new(&session_id, 1);

    let message_command = Command::new(CommandPayload::Message(Message::new(
        MessageId::new(producer_id, 1),
        Destination::queue("orders"),
        Bytes::from_static(b"hello"),
    )));
    tracker.track(&message_command).unwrap();
    tracker.track_back(&message_command);

    track(
        &tracker,
        CommandPayload::MessagePull(MessagePull {
            consumer_id: ConsumerId::new(&session_id, 1),
            destination: Destination::queue("orders"),
            timeout_millis: 0,
        }),
    );

    let transport = MockTransport::new();
    tracker.restore(&transport).unwrap();
    let kinds = payload_kinds(&transport.take_commands());

    let message_position = kinds.iter().position(|kind| *kind == "message").unwrap();
    let pull_position = kinds.iter().position(|kind| *kind == "pull").unwrap();
    let session_position = kinds.iter().rposition(|kind| *kind == "session").unwrap();
    assert!(session_position < message_position);
    assert!(message_position < pull_position);
}

#[test]
fn restore_replays_transactions_with_adopted_producers() {
    let (tracker, connection_id, session_id) = seeded_tracker();
    let producer_id = ProducerId::new(&session_id, 1);
    let transaction_id = TransactionId::new(&connection_id, 9);

    track(
        &tracker,
        CommandPayload::ProducerInfo(ProducerInfo::new(producer_id.clone())),
    );
    track(
        &tracker,
        CommandPayload::Transaction(TransactionInfo::new(
            connection_id.clone(),
            transaction_id.clone(),
            TransactionPhase::Begin,
        )),
    );

    let message = Message::new(
        MessageId::new(producer_id.clone(), 1),
        Destination::queue("orders"),
        Bytes::from_static(b"tx payload"),
    )
    .with_transaction(transaction_id);
    track(&tracker, CommandPayload::Message(message));

    // Close the producer before the commit: the transaction adopts it.
    track(&tracker, CommandPayload::RemoveProducer(producer_id));

    let transport = MockTransport::new();
    tracker.restore(&transport).unwrap();
    let kinds = payload_kinds(&transport.take_commands());

    // The adopted producer is recreated, the transaction commands replayed,
    // then the producer is removed again.
    let producer_positions: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, kind)| **kind == "producer")
        .map(|(index, _)| index)
        .collect();
    let remove_position = kinds
        .iter()
        .position(|kind| *kind == "remove-producer")
        .unwrap();
    let transaction_position = kinds
        .iter()
        .position(|kind| *kind == "transaction")
        .unwrap();

    assert!(producer_positions
        .iter()
        .any(|position| *position < transaction_position));
    assert!(transaction_position < remove_position);
}

#[test]
fn in_doubt_commit_synthesizes_rollback_response() {
    let (tracker, connection_id, _session_id) = seeded_tracker();
    let transaction_id = TransactionId::new(&connection_id, 1);

    track(
        &tracker,
        CommandPayload::Transaction(TransactionInfo::new(
            connection_id.clone(),
            transaction_id.clone(),
            TransactionPhase::Begin,
        )),
    );

    let mut commit = Command::new(CommandPayload::Transaction(TransactionInfo::new(
        connection_id,
        transaction_id,
        TransactionPhase::CommitOnePhase,
    )));
    commit.command_id = 77;
    let tracked = tracker.track(&commit).unwrap().expect("commit tracked");
    assert!(tracked.needs_completion());

    let transport = MockTransport::new();
    let in_doubt = tracker.restore(&transport).unwrap();

    assert_eq!(in_doubt.len(), 1);
    assert_eq!(in_doubt[0].correlation_id, 77);
    match &in_doubt[0].body {
        ResponseBody::Exception(fault) => {
            assert_eq!(fault.exception_class, "TransactionRolledBackException");
        }
        ResponseBody::Ok => panic!("expected an exception response"),
    }

    // The in-doubt transaction's commands are not replayed.
    let kinds = payload_kinds(&transport.take_commands());
    assert!(!kinds.contains(&"transaction"));
}

#[test]
fn interrupted_consumers_restore_pull_only_then_reopen() {
    let (tracker, connection_id, session_id) = seeded_tracker();
    let consumer_id = ConsumerId::new(&session_id, 1);

    track(
        &tracker,
        CommandPayload::ConsumerInfo(
            ConsumerInfo::new(consumer_id.clone(), Destination::queue("orders"))
                .with_prefetch_size(500),
        ),
    );

    // The transport dropped; recovery has not finished yet.
    tracker.transport_interrupted();

    let transport = MockTransport::new();
    tracker.restore(&transport).unwrap();

    let sent = transport.take_commands();
    let restored: Vec<&ConsumerInfo> = sent
        .iter()
        .filter_map(|command| match &command.payload {
            CommandPayload::ConsumerInfo(info) => Some(info),
            _ => None,
        })
        .collect();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].prefetch_size, 0);

    // Recovery completes: the parked window is re-opened via consumer
    // control.
    tracker.connection_interrupt_processing_complete(&transport, &connection_id);
    let sent = transport.take_commands();
    let controls: Vec<_> = sent
        .iter()
        .filter_map(|command| match &command.payload {
            CommandPayload::ConsumerControl(control) => Some(control),
            _ => None,
        })
        .collect();
    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].consumer_id, consumer_id);
    assert_eq!(controls[0].prefetch, 500);

    // A second restore now replays the consumer at full prefetch.
    let transport = MockTransport::new();
    tracker.restore(&transport).unwrap();
    let restored: Vec<_> = transport
        .take_commands()
        .into_iter()
        .filter_map(|command| match command.payload {
            CommandPayload::ConsumerInfo(info) => Some(info),
            _ => None,
        })
        .collect();
    assert_eq!(restored[0].prefetch_size, 500);
}
