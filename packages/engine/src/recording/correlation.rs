// packages/engine/src/recording/correlation.rs
//! Probe id → batch anchor mapping
//!
//! Completion events of asynchronous producers are written under the anchor
//! (first probe) of the batch the producing probe belongs to, so a consumer
//! only needs the anchor and the correlation id to join them.

use crate::probe::ProbeId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Concurrent probe → anchor table
#[derive(Debug, Default)]
pub struct CorrelationTable {
    anchors: DashMap<ProbeId, ProbeId>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every id in `probe_ids` to `anchor`. Re-registering is harmless.
    pub fn register_batch(&self, anchor: ProbeId, probe_ids: &[ProbeId]) {
        for &probe_id in probe_ids {
            self.anchors.insert(probe_id, anchor);
        }
        self.anchors.insert(anchor, anchor);
    }

    /// Anchor for `probe_id`, or `probe_id` itself when it was never registered
    pub fn anchor_of(&self, probe_id: ProbeId) -> ProbeId {
        self.try_anchor_of(probe_id).unwrap_or(probe_id)
    }

    pub fn try_anchor_of(&self, probe_id: ProbeId) -> Option<ProbeId> {
        self.anchors.get(&probe_id).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

/// Correlation minted for one asynchronous producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCorrelation {
    pub correlation_id: i64,

    /// Probe the completion events are written under
    pub anchor_probe_id: ProbeId,
}

/// Process-wide source of correlation ids
///
/// Nanoseconds since the Unix epoch, bumped so that every id handed out is
/// strictly greater than the previous one.
#[derive(Debug, Default)]
pub struct CorrelationClock {
    last: AtomicI64,
}

impl CorrelationClock {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn next_id(&self) -> i64 {
        let now = crate::recording::event::timestamp_ns() as i64;
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => last = observed,
            }
        }
    }
}
