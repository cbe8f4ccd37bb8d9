// packages/engine/src/recording/compressor.rs
//! Batch codec for the durable log: JSON array of [`LogEntry`], zstd framed

use crate::recording::event::LogEntry;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// zstd level preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    /// Level 1; the writer's default since it runs on every flush
    #[default]
    Fast,
    Balanced,
    Best,
}

impl CompressionLevel {
    pub fn as_i32(&self) -> i32 {
        match self {
            CompressionLevel::Fast => 1,
            CompressionLevel::Balanced => 3,
            CompressionLevel::Best => 19,
        }
    }
}

/// Encodes and decodes stored batches
#[derive(Debug, Clone, Copy, Default)]
pub struct Compressor {
    level: CompressionLevel,
}

impl Compressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Serialize `entries` and compress the result
    pub fn encode_batch(&self, entries: &[LogEntry]) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(entries).map_err(|e| {
            EngineError::RecordingFailed(format!("Batch serialization error: {}", e))
        })?;
        let compressed = self.compress(&json)?;

        trace!(
            "Encoded {} entries: {} -> {} bytes",
            entries.len(),
            json.len(),
            compressed.len()
        );
        Ok(compressed)
    }

    /// Inverse of [`Compressor::encode_batch`]
    pub fn decode_batch(&self, data: &[u8]) -> Result<Vec<LogEntry>> {
        let json = self.decompress(data)?;
        serde_json::from_slice(&json)
            .map_err(|e| EngineError::StorageFailed(format!("Corrupt batch: {}", e)))
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, self.level.as_i32())
            .map_err(|e| EngineError::CompressionFailed(format!("Compression error: {}", e)))
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data)
            .map_err(|e| EngineError::CompressionFailed(format!("Decompression error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::event::RecordedEvent;

    fn sample_batch(len: i32) -> Vec<LogEntry> {
        let mut entries = vec![LogEntry::Weave {
            class_id: 1,
            probe_ids: (0..len).collect(),
        }];
        entries.extend((0..len).map(|n| {
            LogEntry::Event(RecordedEvent {
                probe_id: n,
                value: i64::from(n) * 7,
                payload: (n % 2 == 0).then(|| br#"{"id":1}"#.to_vec()),
                timestamp_ns: 1_700_000_000_000_000_000 + n as u64,
                thread: "main".to_string(),
                is_anchor: false,
            })
        }));
        entries
    }

    #[test]
    fn test_batch_encoding() {
        let compressor = Compressor::default();
        let entries = sample_batch(3);

        let encoded = compressor.encode_batch(&entries).unwrap();
        assert_eq!(compressor.decode_batch(&encoded).unwrap(), entries);
    }

    #[test]
    fn test_repetitive_batches_shrink() {
        let entries = sample_batch(500);
        let json_len = serde_json::to_vec(&entries).unwrap().len();

        for level in [CompressionLevel::Fast, CompressionLevel::Best] {
            let encoded = Compressor::new(level).encode_batch(&entries).unwrap();
            assert!(encoded.len() * 4 < json_len, "{:?} barely compressed", level);
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        let compressor = Compressor::default();
        assert!(matches!(
            compressor.decompress(b"not zstd"),
            Err(EngineError::CompressionFailed(_))
        ));

        let not_entries = compressor.compress(b"[1,2,3]").unwrap();
        assert!(matches!(
            compressor.decode_batch(&not_entries),
            Err(EngineError::StorageFailed(_))
        ));
    }

    #[test]
    fn test_level_names() {
        let level: CompressionLevel = serde_json::from_str("\"best\"").unwrap();
        assert_eq!(level.as_i32(), 19);
        assert_eq!(Compressor::default().level(), CompressionLevel::Fast);
    }
}
