//! Pluggable wire serialization.
//!
//! The pipeline does not care how [`PushTaskRequest`](crate::PushTaskRequest)
//! bytes look on the wire; a transport picks a [`MessageCodec`] and both
//! sides agree on it. [`JsonCodec`] is the default — human-readable, handy
//! in tests and when debugging captures.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error from encoding or decoding a wire message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to encode a message to bytes.
    #[error("encode failed: {0}")]
    Encode(String),
    /// Failed to decode bytes into a message.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// A wire serialization format.
///
/// Message types are bounded by serde's `Serialize`/`DeserializeOwned`, so
/// any serde-compatible format (JSON, bincode, messagepack, ...) can be
/// plugged in.
pub trait MessageCodec: Clone + 'static {
    /// Encode a message to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes into a message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if deserialization fails.
    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(msg).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(buf).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
