use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use courier::commands::{
    Command, CommandPayload, ConnectionId, ConsumerId, Destination, Message, MessageDispatch,
    MessageId, ProducerId, Response, SessionId,
};
use courier::messaging::DispatchChannel;
use courier::transport::{MockTransport, ResponseCorrelator, TransportError};

fn dispatch(sequence: i64) -> MessageDispatch {
    let connection = ConnectionId::new("conn");
    let session = SessionId::new(&connection, 1);
    let message = Message::new(
        MessageId::new(ProducerId::new(&session, 1), sequence),
        Destination::queue("orders"),
        Bytes::new(),
    );
    MessageDispatch::new(ConsumerId::new(&session, 1), message)
}

fn sequence_of(dispatch: &MessageDispatch) -> i64 {
    dispatch.message.message_id.producer_sequence_id
}

#[test]
fn channel_preserves_fifo_and_front_insertion() {
    let channel = DispatchChannel::new();
    channel.enqueue(dispatch(1));
    channel.enqueue(dispatch(2));
    channel.start();
    assert_eq!(channel.dequeue_no_wait().map(|d| sequence_of(&d)), Some(1));
    assert_eq!(channel.dequeue_no_wait().map(|d| sequence_of(&d)), Some(2));

    // Front-inserted items are seen before older front-inserted items and
    // before anything enqueued normally.
    channel.enqueue(dispatch(3));
    channel.enqueue_first(dispatch(4));
    channel.enqueue_first(dispatch(5));
    assert_eq!(channel.dequeue_no_wait().map(|d| sequence_of(&d)), Some(5));
    assert_eq!(channel.dequeue_no_wait().map(|d| sequence_of(&d)), Some(4));
    assert_eq!(channel.dequeue_no_wait().map(|d| sequence_of(&d)), Some(3));
}

#[test]
fn channel_gates_visibility_on_run_state() {
    let channel = DispatchChannel::new();
    channel.enqueue(dispatch(1));
    channel.enqueue(dispatch(2));
    channel.enqueue(dispatch(3));

    assert_eq!(channel.dequeue_no_wait(), None);
    assert_eq!(channel.peek(), None);

    let drained = channel.remove_all();
    assert_eq!(drained.len(), 3);
    assert_eq!(channel.size(), 0);

    channel.close();
    channel.start();
    assert!(!channel.is_running());
    assert!(channel.is_closed());
}

#[test]
fn timed_dequeue_blocks_for_the_requested_duration() {
    let channel = DispatchChannel::new();
    channel.start();

    let before = Instant::now();
    let result = channel.dequeue(Some(Duration::from_millis(1000)));
    let elapsed = before.elapsed();

    assert_eq!(result, None);
    assert!(
        elapsed >= Duration::from_millis(1000),
        "dequeue returned after {elapsed:?}"
    );
}

#[test]
fn dequeue_wakes_for_cross_thread_enqueue() {
    let channel = Arc::new(DispatchChannel::new());
    channel.start();

    let pusher = Arc::clone(&channel);
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        pusher.enqueue(dispatch(1));
    });

    let before = Instant::now();
    let received = channel.dequeue(Some(Duration::from_secs(10)));
    handle.join().unwrap();

    assert_eq!(received.map(|d| sequence_of(&d)), Some(1));
    assert!(before.elapsed() < Duration::from_secs(10));
}

#[test]
fn dequeue_wakes_when_started_with_backlog() {
    let channel = Arc::new(DispatchChannel::new());
    channel.enqueue(dispatch(7));

    let starter = Arc::clone(&channel);
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        starter.start();
    });

    let received = channel.dequeue(Some(Duration::from_secs(10)));
    handle.join().unwrap();
    assert_eq!(received.map(|d| sequence_of(&d)), Some(7));
}

#[test]
fn correlator_round_trip_with_reader_thread() {
    let correlator = Arc::new(ResponseCorrelator::new(MockTransport::new()));

    // A stand-in for the transport-reader thread: answer every request in
    // the order it was sent.
    let reader = Arc::clone(&correlator);
    let reader_handle = std::thread::spawn(move || {
        let mut answered = 0;
        while answered < 2 {
            for command in reader.inner().take_commands() {
                if command.response_required {
                    reader.on_command(Command::new(CommandPayload::Response(Response::ok(
                        command.command_id,
                    ))));
                    answered += 1;
                }
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    });

    let first = correlator
        .request(Command::new(CommandPayload::KeepAlive))
        .unwrap();
    let second = correlator
        .request(Command::new(CommandPayload::KeepAlive))
        .unwrap();
    reader_handle.join().unwrap();

    assert!(!first.is_exception());
    assert!(!second.is_exception());
    assert_eq!(correlator.outstanding(), 0);
}

#[test]
fn correlator_dispose_releases_blocked_request() {
    let correlator = Arc::new(ResponseCorrelator::new(MockTransport::new()));

    let disposer = Arc::clone(&correlator);
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        disposer.dispose(TransportError::Io("broker went away".to_string()));
    });

    let before = Instant::now();
    let response = correlator
        .request(Command::new(CommandPayload::KeepAlive))
        .unwrap();
    handle.join().unwrap();

    assert!(response.is_exception());
    assert!(before.elapsed() < Duration::from_secs(5));

    // The failure is latched for every later request.
    let result = correlator.request(Command::new(CommandPayload::KeepAlive));
    assert_eq!(
        result,
        Err(TransportError::Io("broker went away".to_string()))
    );
}
