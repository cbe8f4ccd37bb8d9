// packages/engine/src/utils/errors.rs
//! Error types for the recording engine
//!
//! Nothing in here crosses the instrumented call boundary: the recording entry
//! points are total and swallow these internally. The types surface only from
//! construction, registration, storage and export.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Capture policy records nothing and is not explicitly disabled
    #[error("invalid capture policy: {0}")]
    InvalidPolicy(String),

    /// A value could not be turned into a payload
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// Recording pipeline failure (queue full, writer gone)
    #[error("recording failed: {0}")]
    RecordingFailed(String),

    /// Sink rejected an append or registration
    #[error("sink failed: {0}")]
    SinkFailed(String),

    /// Storage backend failure
    #[error("storage failed: {0}")]
    StorageFailed(String),

    /// zstd compression/decompression failure
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// Export failure
    #[error("export failed: {0}")]
    ExportFailed(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::SerializationFailed(e.to_string())
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(e: config::ConfigError) -> Self {
        EngineError::ConfigError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidPolicy("no categories".to_string());
        assert_eq!(err.to_string(), "invalid capture policy: no categories");
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: EngineError = parse.unwrap_err().into();
        assert!(matches!(err, EngineError::SerializationFailed(_)));
    }
}
