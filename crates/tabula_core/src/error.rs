//! Error types for Tabula core.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification of failures reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing parameter.
    IllegalArgument,
    /// Requested record or file is absent.
    FileNotFound,
    /// Duplicate unique key.
    Conflict,
    /// I/O or invariant failure.
    InternalServerError,
    /// Operation not supported by this index variant.
    NotImplemented,
}

/// Errors that can occur in Tabula core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] tabula_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] tabula_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A parameter was malformed or missing.
    #[error("illegal argument: {message}")]
    IllegalArgument {
        /// Description of the problem.
        message: String,
    },

    /// A record, file or index was not found.
    #[error("not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// A unique index already maps the key to another address.
    #[error("conflict in index {index}: key {key} already maps to address {existing}")]
    Conflict {
        /// Index name.
        index: String,
        /// Display form of the conflicting key.
        key: String,
        /// Address already holding the key.
        existing: u64,
    },

    /// The index variant does not support the operation.
    #[error("{operation} is not implemented by {index}")]
    NotImplemented {
        /// Operation name.
        operation: &'static str,
        /// Index kind.
        index: &'static str,
    },

    /// A named lock could not be acquired in time.
    #[error("timed out after {timeout:?} waiting for lock {name}")]
    LockTimeout {
        /// Lock name.
        name: String,
        /// How long the caller waited.
        timeout: Duration,
    },

    /// An online resize was abandoned.
    #[error("resize aborted: {reason}")]
    ResizeAborted {
        /// Reason for abort.
        reason: String,
    },

    /// A file header or structure is invalid.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl CoreError {
    /// Creates an illegal argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a not implemented error.
    pub fn not_implemented(operation: &'static str, index: &'static str) -> Self {
        Self::NotImplemented { operation, index }
    }

    /// Creates a resize aborted error.
    pub fn resize_aborted(reason: impl Into<String>) -> Self {
        Self::ResizeAborted {
            reason: reason.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns the caller-facing classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IllegalArgument { .. } => ErrorKind::IllegalArgument,
            Self::Codec(tabula_codec::CodecError::SlotOverflow { .. }) => {
                ErrorKind::IllegalArgument
            }
            Self::NotFound { .. } => ErrorKind::FileNotFound,
            Self::Io(e) if e.kind() == io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotImplemented { .. } => ErrorKind::NotImplemented,
            Self::Storage(_)
            | Self::Codec(_)
            | Self::Io(_)
            | Self::LockTimeout { .. }
            | Self::ResizeAborted { .. }
            | Self::InvalidFormat { .. } => ErrorKind::InternalServerError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_codec::CodecError;

    #[test]
    fn error_display() {
        let err = CoreError::not_implemented("like", "hash index");
        assert_eq!(err.to_string(), "like is not implemented by hash index");

        let err = CoreError::Conflict {
            index: "by_name".into(),
            key: "\"alice\"".into(),
            existing: 4,
        };
        assert!(err.to_string().contains("already maps to address 4"));
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            CoreError::illegal_argument("x").kind(),
            ErrorKind::IllegalArgument
        );
        assert_eq!(CoreError::not_found("x").kind(), ErrorKind::FileNotFound);
        assert_eq!(
            CoreError::not_implemented("greater", "hash index").kind(),
            ErrorKind::NotImplemented
        );
        assert_eq!(
            CoreError::from(CodecError::SlotOverflow {
                needed: 10,
                capacity: 4
            })
            .kind(),
            ErrorKind::IllegalArgument
        );
        assert_eq!(
            CoreError::from(CodecError::decoding_failed("bad")).kind(),
            ErrorKind::InternalServerError
        );
        assert_eq!(
            CoreError::LockTimeout {
                name: "t".into(),
                timeout: Duration::from_secs(1)
            }
            .kind(),
            ErrorKind::InternalServerError
        );
    }
}
