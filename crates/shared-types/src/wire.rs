//! Wire encoding shared by all entities.
//!
//! Bincode configured with big-endian fixed-width integers, so variable
//! fields are length-prefixed and numerics match the canonical big-endian
//! hashing order.

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors from entity encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload could not be encoded.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Payload bytes did not decode to the expected entity.
    #[error("malformed payload: {0}")]
    Decode(String),
}

fn options() -> impl Options {
    bincode::options()
        .with_big_endian()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Encode an entity to its stable binary form.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    options()
        .serialize(value)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode an entity from its stable binary form.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    options()
        .deserialize(bytes)
        .map_err(|e| CodecError::Decode(e.to_string()))
}
