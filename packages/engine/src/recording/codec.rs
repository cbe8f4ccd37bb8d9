// packages/engine/src/recording/codec.rs
//! Payload encoding and the fixed diagnostic payloads

use crate::utils::errors::Result;

/// Turns a structured value into payload bytes
pub trait Codec: Send + Sync {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>>;

    fn name(&self) -> &'static str;
}

/// Compact JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Payload written when a bounded-wait completion did not resolve in time
pub const VALUE_UNAVAILABLE: &[u8] = br#"{"error":"value unavailable"}"#;

/// Payload written when a value could not be serialized
pub fn serialization_failure_payload(message: &str) -> Vec<u8> {
    serde_json::json!({
        "error": "failed to serialize object",
        "message": message,
    })
    .to_string()
    .into_bytes()
}

/// Payload written when an asynchronous producer resolves with an error
pub fn async_error_payload(error_type: &str, message: &str) -> Vec<u8> {
    serde_json::json!({
        "error": error_type,
        "message": message,
    })
    .to_string()
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_codec() {
        let bytes = JsonCodec.encode(&serde_json::json!({"a": [1, 2]})).unwrap();
        assert_eq!(bytes, br#"{"a":[1,2]}"#);
        assert_eq!(JsonCodec.encode(&serde_json::Value::Null).unwrap(), b"null");
    }

    #[test]
    fn test_failure_payload_escapes_message() {
        let payload = serialization_failure_payload("bad \"quote\"");
        let parsed: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(parsed["error"], "failed to serialize object");
        assert_eq!(parsed["message"], "bad \"quote\"");
    }

    #[test]
    fn test_unavailable_is_json() {
        let parsed: serde_json::Value = serde_json::from_slice(VALUE_UNAVAILABLE).unwrap();
        assert_eq!(parsed["error"], "value unavailable");
    }
}
