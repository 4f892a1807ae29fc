//! Versioned binary snapshots for durable local state.
//!
//! Snapshots are postcard-encoded and prefixed with a one-byte format
//! version so that a client never misreads state written by an
//! incompatible build.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Error type for snapshot encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The snapshot was written by a different format version.
    #[error("unsupported snapshot version {found} (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion {
        /// Version byte found in the snapshot.
        found: u8,
    },
    /// The snapshot is empty.
    #[error("snapshot is empty")]
    Empty,
}

/// Encodes `value` as a versioned snapshot.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the value cannot be serialized.
pub fn encode_snapshot<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut bytes = vec![SNAPSHOT_VERSION];
    let body = postcard::to_allocvec(value).map_err(|e| CodecError::Serialization(e.to_string()))?;
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Decodes a versioned snapshot.
///
/// # Errors
///
/// Returns `CodecError::Empty` for an empty input,
/// `CodecError::UnsupportedVersion` for a foreign version byte, or
/// `CodecError::Serialization` if the body cannot be deserialized.
pub fn decode_snapshot<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let (&version, body) = bytes.split_first().ok_or(CodecError::Empty)?;
    if version != SNAPSHOT_VERSION {
        return Err(CodecError::UnsupportedVersion { found: version });
    }
    postcard::from_bytes(body).map_err(|e| CodecError::Serialization(e.to_string()))
}
