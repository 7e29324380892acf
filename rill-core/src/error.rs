//! Core error types.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Payload encoding/decoding errors.
///
/// Codec errors are fatal to the single record involved, never to the
/// batch or session processing it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Payload could not be encoded.
    #[error("encode failed: {message}")]
    Encode {
        /// Error description.
        message: String,
    },

    /// Payload was malformed or truncated.
    #[error("decode failed: {message}")]
    Decode {
        /// Error description.
        message: String,
    },
}

/// Result type for core validation.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An argument failed validation.
    #[error("invalid argument {name}: {reason}")]
    InvalidArgument {
        /// Name of the offending argument.
        name: &'static str,
        /// Why it is invalid.
        reason: &'static str,
    },
}
