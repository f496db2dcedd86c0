//! Serialization of error events into the stored `ErrorBody` attribute.

use thiserror::Error;

use super::ErrorEvent;

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Failed to encode error: {0}")]
    Encode(String),

    #[error("Failed to decode error body: {0}")]
    Decode(String),
}

/// Converts error events to and from an opaque string body.
pub trait ErrorCodec: Send + Sync {
    fn encode(&self, error: &ErrorEvent) -> Result<String, CodecError>;

    fn decode(&self, body: &str) -> Result<ErrorEvent, CodecError>;
}

/// JSON body, camelCase field names.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorCodec;

impl ErrorCodec for JsonErrorCodec {
    fn encode(&self, error: &ErrorEvent) -> Result<String, CodecError> {
        serde_json::to_string(error).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, body: &str) -> Result<ErrorEvent, CodecError> {
        serde_json::from_str(body).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
