//! Duplicate-delivery detection.
//!
//! Broker-side recovery and transaction rollback can redeliver a message the
//! application already processed. The audit keeps, per producer, a sliding
//! window of the most recent sequence numbers seen and answers "have I seen
//! this message before" so the consumer layer can acknowledge-and-drop
//! instead of re-presenting it. Memory is bounded twice over: each window
//! holds at most `audit_depth` sequences, and at most
//! `max_producers_to_track` producers are tracked, evicting the
//! least-recently-seen producer first.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;

use crate::commands::{MessageId, ProducerId};

pub const DEFAULT_AUDIT_DEPTH: usize = 2048;
pub const DEFAULT_MAX_PRODUCERS_TO_TRACK: usize = 64;

#[derive(Debug, Default)]
struct SequenceWindow {
    seen: HashSet<i64>,
    order: VecDeque<i64>,
}

impl SequenceWindow {
    /// Record `sequence` if novel; returns true when it was already present.
    fn check_and_record(&mut self, sequence: i64, depth: usize) -> bool {
        if self.seen.contains(&sequence) {
            return true;
        }
        self.seen.insert(sequence);
        self.order.push_back(sequence);
        while self.order.len() > depth {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        false
    }

    fn forget(&mut self, sequence: i64) {
        if self.seen.remove(&sequence) {
            if let Some(position) = self.order.iter().position(|&entry| entry == sequence) {
                self.order.remove(position);
            }
        }
    }

    fn highest(&self) -> Option<i64> {
        self.seen.iter().copied().max()
    }
}

struct AuditInner {
    audit_depth: usize,
    max_producers: usize,
    windows: HashMap<ProducerId, SequenceWindow>,
    /// Least-recently-seen producer first.
    usage_order: Vec<ProducerId>,
}

impl AuditInner {
    fn window_mut(&mut self, producer: &ProducerId) -> &mut SequenceWindow {
        if self.windows.contains_key(producer) {
            self.touch(producer);
        } else {
            self.windows
                .insert(producer.clone(), SequenceWindow::default());
            self.usage_order.push(producer.clone());
            while self.windows.len() > self.max_producers {
                self.evict_lru();
            }
        }
        self.windows.entry(producer.clone()).or_default()
    }

    fn touch(&mut self, producer: &ProducerId) {
        if let Some(position) = self.usage_order.iter().position(|entry| entry == producer) {
            let entry = self.usage_order.remove(position);
            self.usage_order.push(entry);
        }
    }

    fn evict_lru(&mut self) {
        if self.usage_order.is_empty() {
            return;
        }
        let evicted = self.usage_order.remove(0);
        self.windows.remove(&evicted);
    }
}

/// Per-connection duplicate detector over message ids.
pub struct MessageAudit {
    inner: Mutex<AuditInner>,
}

impl Default for MessageAudit {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_DEPTH, DEFAULT_MAX_PRODUCERS_TO_TRACK)
    }
}

impl MessageAudit {
    pub fn new(audit_depth: usize, max_producers_to_track: usize) -> Self {
        Self {
            inner: Mutex::new(AuditInner {
                audit_depth,
                max_producers: max_producers_to_track,
                windows: HashMap::new(),
                usage_order: Vec::new(),
            }),
        }
    }

    /// Check whether `message_id` was already seen, recording it when novel.
    pub fn is_duplicate(&self, message_id: &MessageId) -> bool {
        let mut inner = self.inner.lock();
        let depth = inner.audit_depth;
        inner
            .window_mut(&message_id.producer_id)
            .check_and_record(message_id.producer_sequence_id, depth)
    }

    /// Undo the recording of `message_id` so a rolled-back delivery is
    /// recognized as non-duplicate on its next arrival.
    pub fn rollback(&self, message_id: &MessageId) {
        let mut inner = self.inner.lock();
        if let Some(window) = inner.windows.get_mut(&message_id.producer_id) {
            window.forget(message_id.producer_sequence_id);
        }
    }

    /// Whether `message_id` carries the highest sequence recorded for its
    /// producer, i.e. arrived in order.
    pub fn is_in_order(&self, message_id: &MessageId) -> bool {
        let inner = self.inner.lock();
        match inner.windows.get(&message_id.producer_id) {
            Some(window) => window.highest() == Some(message_id.producer_sequence_id),
            None => false,
        }
    }

    /// Highest sequence recorded for `producer`, or -1 when untracked.
    pub fn last_sequence_id(&self, producer: &ProducerId) -> i64 {
        let inner = self.inner.lock();
        inner
            .windows
            .get(producer)
            .and_then(SequenceWindow::highest)
            .unwrap_or(-1)
    }

    pub fn audit_depth(&self) -> usize {
        self.inner.lock().audit_depth
    }

    /// Adjust the per-producer window depth for windows recorded from now on.
    pub fn set_audit_depth(&self, depth: usize) {
        self.inner.lock().audit_depth = depth;
    }

    pub fn max_producers_to_track(&self) -> usize {
        self.inner.lock().max_producers
    }

    /// Adjust the producer bound; shrinking evicts least-recently-seen
    /// producers until the new bound holds.
    pub fn set_max_producers_to_track(&self, max_producers: usize) {
        let mut inner = self.inner.lock();
        inner.max_producers = max_producers;
        while inner.windows.len() > inner.max_producers {
            inner.evict_lru();
        }
    }

    pub fn tracked_producers(&self) -> usize {
        self.inner.lock().windows.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.windows.clear();
        inner.usage_order.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn producer(value: i64) -> ProducerId {
        ProducerId {
            connection_id: "conn".to_string(),
            session_id: 1,
            value,
        }
    }

    fn message(producer_value: i64, sequence: i64) -> MessageId {
        MessageId::new(producer(producer_value), sequence)
    }

    #[test]
    fn test_first_sighting_is_not_duplicate() {
        let audit = MessageAudit::default();
        assert!(!audit.is_duplicate(&message(1, 1)));
        assert!(audit.is_duplicate(&message(1, 1)));
    }

    #[test]
    fn test_window_evicts_oldest_sequences() {
        let audit = MessageAudit::new(4, 8);
        for sequence in 1..=6 {
            assert!(!audit.is_duplicate(&message(1, sequence)));
        }

        // Sequences 3..=6 fill the window; 1 and 2 were evicted.
        assert!(audit.is_duplicate(&message(1, 5)));
        assert!(!audit.is_duplicate(&message(1, 1)));
    }

    #[test]
    fn test_rollback_unrecords_a_sequence() {
        let audit = MessageAudit::default();
        let id = message(1, 7);

        assert!(!audit.is_duplicate(&id));
        assert!(audit.is_duplicate(&id));

        audit.rollback(&id);
        assert!(!audit.is_duplicate(&id));
    }

    #[test]
    fn test_least_recently_seen_producer_evicted() {
        let audit = MessageAudit::new(16, 2);
        audit.is_duplicate(&message(1, 1));
        audit.is_duplicate(&message(2, 1));

        // Refresh producer 1, then introduce producer 3: producer 2 goes.
        audit.is_duplicate(&message(1, 2));
        audit.is_duplicate(&message(3, 1));

        assert_eq!(audit.tracked_producers(), 2);
        assert!(audit.is_duplicate(&message(1, 1)));
        assert!(!audit.is_duplicate(&message(2, 1)));
    }

    #[test]
    fn test_shrinking_producer_bound_prunes() {
        let audit = MessageAudit::new(16, 4);
        for value in 1..=4 {
            audit.is_duplicate(&message(value, 1));
        }
        audit.set_max_producers_to_track(1);
        assert_eq!(audit.tracked_producers(), 1);
        // Only the most recently seen producer survives.
        assert!(audit.is_duplicate(&message(4, 1)));
    }

    #[test]
    fn test_in_order_tracks_highest_sequence() {
        let audit = MessageAudit::default();
        audit.is_duplicate(&message(1, 1));
        audit.is_duplicate(&message(1, 2));
        audit.is_duplicate(&message(1, 3));

        assert!(audit.is_in_order(&message(1, 3)));
        assert!(!audit.is_in_order(&message(1, 2)));
        assert_eq!(audit.last_sequence_id(&producer(1)), 3);
        assert_eq!(audit.last_sequence_id(&producer(99)), -1);
    }
}
