// packages/engine/src/recording/exporter.rs
//! Export recorded events
//!
//! Supports:
//! - JSON (one pretty-printed array)
//! - JSON Lines (one compact object per event)
//!
//! and joins asynchronous calls with their completion events.

use crate::probe::ProbeId;
use crate::recording::correlation::CorrelationTable;
use crate::recording::event::RecordedEvent;
use crate::utils::errors::{EngineError, Result};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    JsonLines,
}

impl std::str::FromStr for ExportFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "jsonl" | "json-lines" | "ndjson" => Ok(ExportFormat::JsonLines),
            other => Err(EngineError::ExportFailed(format!(
                "Unknown export format '{}'",
                other
            ))),
        }
    }
}

/// Event as written by the exporter
#[derive(Debug, Serialize)]
struct ExportedEvent<'a> {
    probe_id: ProbeId,
    value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
    timestamp: String,
    thread: &'a str,
}

/// An asynchronous call and the outcomes written for it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelatedCall {
    pub probe_id: ProbeId,
    pub anchor_probe_id: ProbeId,
    pub object_id: i64,
    pub correlation_id: i64,
    pub started_ns: u64,
    /// Completion payloads in log order; empty while pending or abandoned
    pub outcomes: Vec<serde_json::Value>,
}

/// Exporter for recorded events
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    /// Create a new exporter
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    /// Export events to string
    pub fn export(&self, events: &[RecordedEvent]) -> Result<String> {
        debug!("Exporting {} events to {:?} format", events.len(), self.format);

        let exported: Vec<ExportedEvent<'_>> = events.iter().map(to_exported).collect();

        match self.format {
            ExportFormat::Json => serde_json::to_string_pretty(&exported).map_err(|e| {
                EngineError::ExportFailed(format!("JSON serialization error: {}", e))
            }),
            ExportFormat::JsonLines => {
                let mut out = String::new();
                for event in &exported {
                    let line = serde_json::to_string(event).map_err(|e| {
                        EngineError::ExportFailed(format!("JSON serialization error: {}", e))
                    })?;
                    out.push_str(&line);
                    out.push('\n');
                }
                Ok(out)
            }
        }
    }

    /// Export correlated calls in the exporter's format
    pub fn export_calls(&self, calls: &[CorrelatedCall]) -> Result<String> {
        let rendered = match self.format {
            ExportFormat::Json => serde_json::to_string_pretty(calls),
            ExportFormat::JsonLines => calls
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(|lines| lines.into_iter().map(|l| l + "\n").collect()),
        };
        rendered.map_err(|e| EngineError::ExportFailed(format!("JSON serialization error: {}", e)))
    }
}

/// Join every anchor event with the completion events written under
/// `(anchor_of(probe_id), correlation_id)`
pub fn correlate(events: &[RecordedEvent], table: &CorrelationTable) -> Vec<CorrelatedCall> {
    let mut completions: HashMap<(ProbeId, i64), Vec<&RecordedEvent>> = HashMap::new();
    for event in events {
        completions
            .entry((event.probe_id, event.value))
            .or_default()
            .push(event);
    }

    events
        .iter()
        .filter_map(|event| {
            let correlation_id = event.correlation_id()?;
            let anchor_probe_id = table.anchor_of(event.probe_id);

            let outcomes = completions
                .get(&(anchor_probe_id, correlation_id))
                .map(|found| {
                    found
                        .iter()
                        .filter(|c| !std::ptr::eq(**c, event))
                        .map(|c| render_payload(c.payload.as_deref()))
                        .collect()
                })
                .unwrap_or_default();

            Some(CorrelatedCall {
                probe_id: event.probe_id,
                anchor_probe_id,
                object_id: event.value,
                correlation_id,
                started_ns: event.timestamp_ns,
                outcomes,
            })
        })
        .collect()
}

fn to_exported(event: &RecordedEvent) -> ExportedEvent<'_> {
    ExportedEvent {
        probe_id: event.probe_id,
        value: event.value,
        payload: event
            .payload
            .as_deref()
            .map(|bytes| render_payload(Some(bytes))),
        timestamp: format_timestamp(event.timestamp_ns),
        thread: &event.thread,
    }
}

/// JSON payloads as JSON, other UTF-8 as a string, anything else as a byte array
fn render_payload(payload: Option<&[u8]>) -> serde_json::Value {
    let Some(bytes) = payload else {
        return serde_json::Value::Null;
    };
    if let Ok(value) = serde_json::from_slice(bytes) {
        return value;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => serde_json::Value::String(text.to_string()),
        Err(_) => serde_json::Value::from(bytes.to_vec()),
    }
}

fn format_timestamp(timestamp_ns: u64) -> String {
    use chrono::{DateTime, Utc};
    let secs = (timestamp_ns / 1_000_000_000) as i64;
    let nsecs = (timestamp_ns % 1_000_000_000) as u32;
    let dt = DateTime::<Utc>::from_timestamp(secs, nsecs).unwrap_or_default();
    dt.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(probe_id: ProbeId, value: i64, payload: Option<&[u8]>) -> RecordedEvent {
        RecordedEvent {
            probe_id,
            value,
            payload: payload.map(<[u8]>::to_vec),
            timestamp_ns: 1_234_567_890_000_000_000,
            thread: "main".to_string(),
            is_anchor: false,
        }
    }

    fn anchor(probe_id: ProbeId, object_id: i64, correlation_id: i64) -> RecordedEvent {
        RecordedEvent {
            is_anchor: true,
            ..event(probe_id, object_id, Some(&correlation_id.to_be_bytes()))
        }
    }

    #[test]
    fn test_json_export() {
        let exporter = Exporter::new(ExportFormat::Json);
        let events = vec![event(1, 5, Some(br#"{"a":1}"#)), event(2, 6, None)];

        let json = exporter.export(&events).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed[0]["payload"]["a"], 1);
        assert!(parsed[1].get("payload").is_none());
        assert_eq!(parsed[0]["timestamp"], "2009-02-13T23:31:30+00:00");
    }

    #[test]
    fn test_json_lines_export() {
        let exporter = Exporter::new(ExportFormat::JsonLines);
        let events = vec![
            event(1, 5, None),
            event(2, 6, Some(&[0xff, 0x00])),
            event(3, 7, Some(b"plain text")),
        ];

        let out = exporter.export(&events).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["payload"], serde_json::json!([255, 0]));
        assert_eq!(lines[2]["payload"], "plain text");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("jsonl".parse::<ExportFormat>().unwrap(), ExportFormat::JsonLines);
        assert!("har".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_correlate_joins_completions() {
        let table = CorrelationTable::new();
        table.register_batch(10, &[10, 11, 12]);

        let correlation_id: i64 = 1_700_000_000_000_000_001;
        let pending_id: i64 = 1_700_000_000_000_000_002;
        let events = vec![
            anchor(11, 4, correlation_id),
            anchor(12, 5, pending_id),
            event(10, 99, None),
            event(10, correlation_id, Some(b"[1,2]")),
            event(10, correlation_id, Some(b"3")),
        ];

        let calls = correlate(&events, &table);
        assert_eq!(calls.len(), 2);

        assert_eq!(calls[0].anchor_probe_id, 10);
        assert_eq!(calls[0].object_id, 4);
        assert_eq!(
            calls[0].outcomes,
            vec![serde_json::json!([1, 2]), serde_json::json!(3)]
        );

        assert_eq!(calls[1].correlation_id, pending_id);
        assert!(calls[1].outcomes.is_empty());

        let exported = Exporter::new(ExportFormat::JsonLines)
            .export_calls(&calls)
            .unwrap();
        assert_eq!(exported.lines().count(), 2);
    }

    #[test]
    fn test_eight_byte_payloads_are_not_calls() {
        let table = CorrelationTable::new();
        let correlation_id: i64 = 1_700_000_000_000_000_003;
        let events = vec![
            event(1, 4, Some(b"12345678")),
            event(2, 5, Some(br#""abcdef""#)),
            event(3, 6, Some(&[0u8, 1, 2, 3, 4, 5, 6, 7])),
            anchor(4, 7, correlation_id),
            event(4, correlation_id, Some(&42i64.to_be_bytes())),
        ];

        let calls = correlate(&events, &table);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].probe_id, 4);
        assert_eq!(calls[0].outcomes.len(), 1);
    }
}
