//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// The encoded payload does not fit into a slot.
    #[error("payload of {needed} bytes does not fit a {capacity}-byte slot")]
    SlotOverflow {
        /// Bytes required including the length prefix.
        needed: usize,
        /// The slot length.
        capacity: usize,
    },

    /// The slot declares more payload than it holds.
    #[error("slot declares {declared} payload bytes but holds {available}")]
    Truncated {
        /// Declared payload length.
        declared: usize,
        /// Bytes available after the prefix.
        available: usize,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
