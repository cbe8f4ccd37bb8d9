// packages/engine/src/recording/event.rs
//! Log entries

use crate::probe::{ClassId, ProbeId};
use serde::{Deserialize, Serialize};

/// One event in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub probe_id: ProbeId,

    /// Object id, encoded scalar, or correlation id for completion events
    pub value: i64,

    /// Serialized value, anchor correlation bytes, or nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,

    /// Wall clock (nanoseconds since epoch)
    pub timestamp_ns: u64,

    /// Name (or id) of the thread that wrote the event
    pub thread: String,

    /// Set only on the anchor event of an asynchronous producer
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_anchor: bool,
}

impl RecordedEvent {
    /// Stamp an event with the current time and thread
    pub fn now(probe_id: ProbeId, value: i64, payload: Option<&[u8]>) -> Self {
        Self {
            probe_id,
            value,
            payload: payload.map(<[u8]>::to_vec),
            timestamp_ns: timestamp_ns(),
            thread: current_thread_label(),
            is_anchor: false,
        }
    }

    /// Anchor event: the producer's object id, with the correlation id as
    /// 8 big-endian payload bytes
    pub fn anchor(probe_id: ProbeId, object_id: i64, correlation_id: i64) -> Self {
        Self {
            is_anchor: true,
            ..Self::now(probe_id, object_id, Some(&correlation_id.to_be_bytes()))
        }
    }

    /// Correlation id carried by an anchor event
    pub fn correlation_id(&self) -> Option<i64> {
        if !self.is_anchor {
            return None;
        }
        let bytes: [u8; 8] = self.payload.as_deref()?.try_into().ok()?;
        Some(i64::from_be_bytes(bytes))
    }

    /// Payload parsed as JSON, if it is JSON
    pub fn payload_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(self.payload.as_deref()?).ok()
    }
}

/// Entry in the durable log: either an event or a batch registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntry {
    Event(RecordedEvent),
    Weave {
        class_id: ClassId,
        probe_ids: Vec<ProbeId>,
    },
}

impl LogEntry {
    pub fn as_event(&self) -> Option<&RecordedEvent> {
        match self {
            LogEntry::Event(event) => Some(event),
            LogEntry::Weave { .. } => None,
        }
    }
}

pub(crate) fn timestamp_ns() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map(|ns| ns.max(0) as u64)
        .unwrap_or(0)
}

fn current_thread_label() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}
