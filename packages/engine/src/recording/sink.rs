// packages/engine/src/recording/sink.rs
//! Event sinks
//!
//! The engine hands every finished event to a [`Sink`]. Appends are best
//! effort: an error is logged and counted by the engine, never retried.

use crate::probe::{ClassId, ProbeId};
use crate::recording::event::RecordedEvent;
use crate::utils::errors::Result;
use parking_lot::Mutex;

/// Append-only destination for events
pub trait Sink: Send + Sync {
    /// Append one event
    fn append(&self, probe_id: ProbeId, value: i64, payload: Option<&[u8]>) -> Result<()>;

    /// Append the anchor event of an asynchronous producer
    fn append_anchor(&self, probe_id: ProbeId, object_id: i64, correlation_id: i64) -> Result<()>;

    /// Record that a class's probes were registered
    fn register_batch(&self, class_id: ClassId, probe_ids: &[ProbeId]) -> Result<()>;
}

/// Drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl Sink for DiscardSink {
    fn append(&self, _probe_id: ProbeId, _value: i64, _payload: Option<&[u8]>) -> Result<()> {
        Ok(())
    }

    fn append_anchor(
        &self,
        _probe_id: ProbeId,
        _object_id: i64,
        _correlation_id: i64,
    ) -> Result<()> {
        Ok(())
    }

    fn register_batch(&self, _class_id: ClassId, _probe_ids: &[ProbeId]) -> Result<()> {
        Ok(())
    }
}

/// Keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RecordedEvent>>,
    batches: Mutex<Vec<(ClassId, Vec<ProbeId>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events appended so far, in append order
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Events written under `probe_id`
    pub fn events_for(&self, probe_id: ProbeId) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.probe_id == probe_id)
            .cloned()
            .collect()
    }

    pub fn batches(&self) -> Vec<(ClassId, Vec<ProbeId>)> {
        self.batches.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Sink for MemorySink {
    fn append(&self, probe_id: ProbeId, value: i64, payload: Option<&[u8]>) -> Result<()> {
        self.events
            .lock()
            .push(RecordedEvent::now(probe_id, value, payload));
        Ok(())
    }

    fn append_anchor(&self, probe_id: ProbeId, object_id: i64, correlation_id: i64) -> Result<()> {
        self.events
            .lock()
            .push(RecordedEvent::anchor(probe_id, object_id, correlation_id));
        Ok(())
    }

    fn register_batch(&self, class_id: ClassId, probe_ids: &[ProbeId]) -> Result<()> {
        self.batches.lock().push((class_id, probe_ids.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.append(1, 10, None).unwrap();
        sink.append(2, 20, Some(b"x")).unwrap();
        sink.append(1, 11, None).unwrap();

        let values: Vec<i64> = sink.events().iter().map(|e| e.value).collect();
        assert_eq!(values, vec![10, 20, 11]);
        assert_eq!(sink.events_for(1).len(), 2);
        assert_eq!(sink.events_for(2)[0].payload.as_deref(), Some(&b"x"[..]));
    }

    #[test]
    fn test_only_anchors_carry_correlation() {
        let sink = MemorySink::new();
        sink.append(1, 10, Some(&5i64.to_be_bytes())).unwrap();
        sink.append_anchor(1, 11, 5).unwrap();

        let events = sink.events();
        assert_eq!(events[0].correlation_id(), None);
        assert_eq!(events[1].correlation_id(), Some(5));
        assert_eq!(events[1].value, 11);
    }

    #[test]
    fn test_discard_sink() {
        let sink = DiscardSink;
        assert!(sink.append(1, 1, None).is_ok());
        assert!(sink.append_anchor(1, 1, 1).is_ok());
        assert!(sink.register_batch(1, &[1]).is_ok());
    }
}
