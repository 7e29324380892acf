//! Client limits.
//!
//! Put limits on everything: every record, batch, and poll interval has
//! an explicit maximum so client memory use stays predictable.

use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// Client-wide limits for Rill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum serialized size of a single record frame in bytes.
    pub record_bytes_max: u32,
    /// Maximum cumulative serialized record size of a batch in bytes.
    pub batch_bytes_max: u32,
    /// Maximum number of records in a batch.
    pub batch_records_max: u32,
    /// How long a single transport receive waits before the consumer
    /// re-checks deadline and cancellation, in microseconds.
    pub receive_poll_us: u64,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // 256 KB record, 1 MB batch, 500 records/batch.
            record_bytes_max: 256 * 1024,
            batch_bytes_max: 1024 * 1024,
            batch_records_max: 500,
            // 50 ms receive poll.
            receive_poll_us: 50 * 1000,
        }
    }

    /// Returns the receive poll interval as a [`Duration`].
    #[must_use]
    pub const fn receive_poll(&self) -> Duration {
        Duration::from_micros(self.receive_poll_us)
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limit is invalid or inconsistent.
    pub fn validate(&self) -> CoreResult<()> {
        if self.record_bytes_max == 0 {
            return Err(CoreError::InvalidArgument {
                name: "record_bytes_max",
                reason: "must be positive",
            });
        }

        if self.batch_bytes_max < self.record_bytes_max {
            return Err(CoreError::InvalidArgument {
                name: "batch_bytes_max",
                reason: "must be >= record_bytes_max",
            });
        }

        if self.batch_records_max == 0 {
            return Err(CoreError::InvalidArgument {
                name: "batch_records_max",
                reason: "must be positive",
            });
        }

        if self.receive_poll_us == 0 {
            return Err(CoreError::InvalidArgument {
                name: "receive_poll_us",
                reason: "must be positive",
            });
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
