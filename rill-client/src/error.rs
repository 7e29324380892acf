//! Client error taxonomy.
//!
//! Transport and transient errors are surfaced to the immediate caller,
//! never silently swallowed or retried internally. Deadline expiry and
//! cancellation are normal termination, not errors, and never appear
//! here. A full batch is a boolean from `RecordBatch::try_add`, not an
//! error either.

use rill_core::{CodecError, PartitionId};
use thiserror::Error;

use crate::transport::TransportError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by producer and consumer operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A single record is larger than the maximum batch size and can
    /// never be published under the configured limits.
    #[error("record {index} too large: {size} > {max} bytes")]
    RecordTooLarge {
        /// Position of the record in the publish call's input.
        index: usize,
        /// Serialized frame size of the record.
        size: usize,
        /// Configured maximum batch size.
        max: usize,
    },

    /// The caller supplied a partition id the broker does not know.
    #[error("unknown partition: {partition_id}")]
    UnknownPartition {
        /// The offending partition id.
        partition_id: PartitionId,
    },

    /// Partition metadata could not be fetched. Transient; safe for the
    /// caller to retry with backoff.
    #[error("partition metadata unavailable: {message}")]
    MetadataUnavailable {
        /// Error description.
        message: String,
    },

    /// A batch send failed partway through a publish call.
    ///
    /// Batches before `batch_index` are durably committed on the broker
    /// even though the overall call failed; the caller may resend only
    /// the remainder.
    #[error(
        "publish failed at batch {batch_index} ({batches_sent} earlier batches committed): {source}"
    )]
    Publish {
        /// Zero-based index of the batch whose send failed.
        batch_index: usize,
        /// Number of batches acknowledged before the failure.
        batches_sent: usize,
        /// The underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// A consumer session's subscription failed at the transport level.
    ///
    /// The session is terminated and not auto-resumed; the caller may
    /// reopen with `StartPosition::AfterSequenceNumber(last_seen)`.
    #[error("subscription stream failed: {source}")]
    Stream {
        /// The underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// Payload encoding or decoding failed. Fatal to the single record
    /// involved, never to the batch or session.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ClientError {
    /// Returns true if the operation is safe to retry as-is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::MetadataUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_reports_progress() {
        let err = ClientError::Publish {
            batch_index: 2,
            batches_sent: 2,
            source: TransportError::Unavailable {
                message: "broker gone".to_string(),
            },
        };
        let text = format!("{err}");
        assert!(text.contains("batch 2"));
        assert!(text.contains("2 earlier batches committed"));
    }

    #[test]
    fn test_retryable() {
        let transient = ClientError::MetadataUnavailable {
            message: "timeout".to_string(),
        };
        assert!(transient.is_retryable());

        let fatal = ClientError::UnknownPartition {
            partition_id: PartitionId::new(9),
        };
        assert!(!fatal.is_retryable());
    }
}
