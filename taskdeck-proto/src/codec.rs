//! Binary encoding for locally persisted state.
//!
//! Pomodoro and theme state are stored under named keys in local storage as
//! postcard bytes.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for local state encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a persisted value into bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the value cannot be serialized.
pub fn encode_state<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a persisted value from postcard bytes.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes are corrupt or were
/// written by an incompatible version.
pub fn decode_state<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
