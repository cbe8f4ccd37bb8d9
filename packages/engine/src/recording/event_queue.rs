// packages/engine/src/recording/event_queue.rs
//! Bounded lock-free hand-off between recording threads and the log writer
//!
//! Recording threads push, the writer task drains. A full queue rejects the
//! entry and hands it back; nothing blocks.

use crate::recording::event::LogEntry;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    drained: AtomicU64,
    rejected: AtomicU64,
}

/// MPMC queue of [`LogEntry`] values
pub struct EventQueue {
    entries: ArrayQueue<LogEntry>,
    counters: Counters,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: ArrayQueue::new(capacity.max(1)),
            counters: Counters::default(),
        }
    }

    /// Enqueue `entry`, or return it when the queue is full
    pub fn push(&self, entry: LogEntry) -> Result<(), LogEntry> {
        let outcome = self.entries.push(entry);
        let counter = match outcome {
            Ok(()) => &self.counters.accepted,
            Err(_) => &self.counters.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    pub fn try_pop(&self) -> Option<LogEntry> {
        let entry = self.entries.pop()?;
        self.counters.drained.fetch_add(1, Ordering::Relaxed);
        Some(entry)
    }

    /// Pop up to `max` entries into `out`; returns how many were moved
    pub fn drain_into(&self, out: &mut Vec<LogEntry>, max: usize) -> usize {
        let before = out.len();
        out.extend(std::iter::from_fn(|| self.try_pop()).take(max));
        out.len() - before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            push_count: self.counters.accepted.load(Ordering::Relaxed),
            pop_count: self.counters.drained.load(Ordering::Relaxed),
            drop_count: self.counters.rejected.load(Ordering::Relaxed),
            current_size: self.entries.len(),
            capacity: self.entries.capacity(),
        }
    }
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Entries accepted
    pub push_count: u64,
    pub pop_count: u64,
    /// Entries rejected because the queue was full
    pub drop_count: u64,
    pub current_size: usize,
    pub capacity: usize,
}

impl QueueStats {
    /// Share of offered entries that were rejected, in percent
    pub fn rejection_rate(&self) -> f64 {
        let offered = self.push_count + self.drop_count;
        if offered == 0 {
            0.0
        } else {
            self.drop_count as f64 * 100.0 / offered as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::event::RecordedEvent;
    use std::sync::Arc;
    use std::thread;

    fn event(probe_id: i32) -> LogEntry {
        LogEntry::Event(RecordedEvent::now(probe_id, 0, None))
    }

    fn probe_of(entry: &LogEntry) -> i32 {
        entry.as_event().map(|e| e.probe_id).unwrap_or(-1)
    }

    #[test]
    fn test_fifo_across_entry_kinds() {
        let queue = EventQueue::new(10);
        queue.push(event(1)).unwrap();
        queue
            .push(LogEntry::Weave {
                class_id: 2,
                probe_ids: vec![5],
            })
            .unwrap();
        queue.push(event(3)).unwrap();

        assert_eq!(probe_of(&queue.try_pop().unwrap()), 1);
        assert!(matches!(queue.try_pop(), Some(LogEntry::Weave { class_id: 2, .. })));
        assert_eq!(probe_of(&queue.try_pop().unwrap()), 3);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_full_queue_hands_entry_back() {
        let queue = EventQueue::new(2);
        queue.push(event(1)).unwrap();
        queue.push(event(2)).unwrap();
        assert!(queue.is_full());

        let rejected = queue.push(event(3)).unwrap_err();
        assert_eq!(probe_of(&rejected), 3);

        let stats = queue.stats();
        assert_eq!(stats.push_count, 2);
        assert_eq!(stats.drop_count, 1);
        assert!((stats.rejection_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_drain_into_respects_max() {
        let queue = EventQueue::new(10);
        for i in 0..5 {
            queue.push(event(i)).unwrap();
        }

        let mut out = Vec::new();
        assert_eq!(queue.drain_into(&mut out, 3), 3);
        assert_eq!(queue.drain_into(&mut out, 10), 2);
        assert_eq!(out.iter().map(probe_of).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);

        let stats = queue.stats();
        assert_eq!(stats.pop_count, 5);
        assert_eq!(stats.current_size, 0);
        assert_eq!(stats.capacity, 10);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = EventQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(EventQueue::new(1000));
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for j in 0..100 {
                        queue.push(event(i * 100 + j)).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 1000);
        assert_eq!(queue.stats().drop_count, 0);
    }
}
