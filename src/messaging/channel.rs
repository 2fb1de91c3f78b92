//! Per-consumer dispatch queue.
//!
//! The transport-reader thread pushes inbound deliveries in; the consumer's
//! receive path takes them out in order. The channel gates visibility on its
//! run state: while stopped, queued items are held but cannot be observed,
//! which is how delivery is frozen during connection recovery without
//! discarding anything.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::commands::MessageDispatch;

struct ChannelInner {
    queue: VecDeque<MessageDispatch>,
    running: bool,
    closed: bool,
}

/// Ordered, thread-safe queue of deliveries destined for one consumer.
///
/// FIFO for [`enqueue`](DispatchChannel::enqueue); items pushed with
/// [`enqueue_first`](DispatchChannel::enqueue_first) jump ahead of everything
/// already queued, which is how a rolled-back delivery is re-presented before
/// newer messages.
pub struct DispatchChannel {
    inner: Mutex<ChannelInner>,
    available: Condvar,
}

impl Default for DispatchChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchChannel {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                queue: VecDeque::new(),
                running: false,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append a delivery at the tail. Permitted in every state.
    pub fn enqueue(&self, dispatch: MessageDispatch) {
        let mut inner = self.inner.lock();
        inner.queue.push_back(dispatch);
        self.available.notify_all();
    }

    /// Push a delivery at the head, ahead of anything already queued.
    pub fn enqueue_first(&self, dispatch: MessageDispatch) {
        let mut inner = self.inner.lock();
        inner.queue.push_front(dispatch);
        self.available.notify_all();
    }

    /// Make queued items visible and wake blocked dequeuers.
    ///
    /// No-op once the channel is closed.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.running = true;
            self.available.notify_all();
        }
    }

    /// Freeze the channel without discarding its contents.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.running = false;
        self.available.notify_all();
    }

    /// Terminal stop; the channel can never run again.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.running = false;
        self.available.notify_all();
    }

    /// Take the head delivery without blocking.
    ///
    /// Returns `None` while the channel is not running, even when items are
    /// queued.
    pub fn dequeue_no_wait(&self) -> Option<MessageDispatch> {
        let mut inner = self.inner.lock();
        if inner.running {
            inner.queue.pop_front()
        } else {
            None
        }
    }

    /// Take the head delivery, waiting up to `timeout` for one to become
    /// visible.
    ///
    /// `None` blocks until an item is available or the channel closes;
    /// `Some(Duration::ZERO)` polls once without blocking. Returns `None` on
    /// timeout or when the channel is not running.
    pub fn dequeue(&self, timeout: Option<Duration>) -> Option<MessageDispatch> {
        let mut inner = self.inner.lock();
        match timeout {
            None => {
                while !inner.closed && (!inner.running || inner.queue.is_empty()) {
                    self.available.wait(&mut inner);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !inner.closed && (!inner.running || inner.queue.is_empty()) {
                    if Instant::now() >= deadline {
                        break;
                    }
                    if self.available.wait_until(&mut inner, deadline).timed_out() {
                        break;
                    }
                }
            }
        }

        if inner.running {
            inner.queue.pop_front()
        } else {
            None
        }
    }

    /// Observe the head delivery without removing it.
    pub fn peek(&self) -> Option<MessageDispatch> {
        let inner = self.inner.lock();
        if inner.running {
            inner.queue.front().cloned()
        } else {
            None
        }
    }

    /// Drain every queued delivery, regardless of run state.
    pub fn remove_all(&self) -> Vec<MessageDispatch> {
        let mut inner = self.inner.lock();
        inner.queue.drain(..).collect()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{
        ConnectionId, ConsumerId, Destination, Message, MessageId, ProducerId, SessionId,
    };
    use bytes::Bytes;

    fn dispatch(sequence: i64) -> MessageDispatch {
        let connection = ConnectionId::new("conn");
        let session = SessionId::new(&connection, 1);
        let producer = ProducerId::new(&session, 1);
        let consumer = ConsumerId::new(&session, 1);
        let message = Message::new(
            MessageId::new(producer, sequence),
            Destination::queue("orders"),
            Bytes::new(),
        );
        MessageDispatch::new(consumer, message)
    }

    fn sequence_of(dispatch: &MessageDispatch) -> i64 {
        dispatch.message.message_id.producer_sequence_id
    }

    #[test]
    fn test_fifo_order() {
        let channel = DispatchChannel::new();
        channel.enqueue(dispatch(1));
        channel.enqueue(dispatch(2));
        channel.start();

        assert_eq!(channel.dequeue_no_wait().map(|d| sequence_of(&d)), Some(1));
        assert_eq!(channel.dequeue_no_wait().map(|d| sequence_of(&d)), Some(2));
        assert_eq!(channel.dequeue_no_wait(), None);
    }

    #[test]
    fn test_enqueue_first_jumps_the_queue() {
        let channel = DispatchChannel::new();
        channel.enqueue_first(dispatch(1));
        channel.enqueue_first(dispatch(2));
        channel.start();

        assert_eq!(channel.dequeue_no_wait().map(|d| sequence_of(&d)), Some(2));
        assert_eq!(channel.dequeue_no_wait().map(|d| sequence_of(&d)), Some(1));
    }

    #[test]
    fn test_items_invisible_until_started() {
        let channel = DispatchChannel::new();
        channel.enqueue(dispatch(1));

        assert_eq!(channel.dequeue_no_wait(), None);
        assert_eq!(channel.peek(), None);
        assert_eq!(channel.size(), 1);

        channel.start();
        assert!(channel.peek().is_some());
        assert!(channel.dequeue_no_wait().is_some());
    }

    #[test]
    fn test_stop_hides_items_again() {
        let channel = DispatchChannel::new();
        channel.start();
        channel.enqueue(dispatch(1));
        channel.stop();

        assert_eq!(channel.dequeue_no_wait(), None);
        assert_eq!(channel.dequeue(Some(Duration::ZERO)), None);
        assert_eq!(channel.size(), 1);
    }

    #[test]
    fn test_close_is_terminal() {
        let channel = DispatchChannel::new();
        channel.start();
        channel.close();
        channel.start();

        assert!(channel.is_closed());
        assert!(!channel.is_running());
    }

    #[test]
    fn test_remove_all_drains_while_stopped() {
        let channel = DispatchChannel::new();
        channel.enqueue(dispatch(1));
        channel.enqueue(dispatch(2));
        channel.enqueue(dispatch(3));

        let drained = channel.remove_all();
        assert_eq!(drained.len(), 3);
        assert_eq!(channel.size(), 0);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_timed_dequeue_waits_out_the_timeout() {
        let channel = DispatchChannel::new();
        channel.start();

        let before = Instant::now();
        let result = channel.dequeue(Some(Duration::from_millis(150)));
        let elapsed = before.elapsed();

        assert_eq!(result, None);
        assert!(elapsed >= Duration::from_millis(150));
    }

    #[test]
    fn test_blocked_dequeue_woken_by_enqueue() {
        use std::sync::Arc;

        let channel = Arc::new(DispatchChannel::new());
        channel.start();

        let producer_side = Arc::clone(&channel);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer_side.enqueue(dispatch(9));
        });

        let got = channel.dequeue(Some(Duration::from_secs(5)));
        handle.join().unwrap();
        assert_eq!(got.map(|d| sequence_of(&d)), Some(9));
    }

    #[test]
    fn test_blocked_dequeue_released_by_close() {
        use std::sync::Arc;

        let channel = Arc::new(DispatchChannel::new());
        channel.start();

        let closer_side = Arc::clone(&channel);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            closer_side.close();
        });

        let got = channel.dequeue(None);
        handle.join().unwrap();
        assert_eq!(got, None);
        assert!(channel.is_closed());
    }
}
