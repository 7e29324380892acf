//! Size-bounded record batches.
//!
//! A batch accumulates records under a maximum cumulative serialized
//! size. A full batch is an expected, recoverable condition signaled by
//! the boolean from [`RecordBatch::try_add`]; callers split an oversized
//! input across multiple batches without exception-driven control flow.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rill_core::Record;

use crate::router::RoutedTarget;

/// An ordered, size-bounded sequence of records destined for one target.
///
/// Invariant: the sum of serialized record frame sizes never exceeds the
/// configured maximum. The target is fixed at creation.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// Target partition choice, fixed at creation.
    target: RoutedTarget,
    /// Maximum cumulative serialized record size.
    max_bytes: usize,
    /// Accepted records, in insertion order.
    records: Vec<Record>,
    /// Current cumulative serialized record size.
    byte_size: usize,
}

impl RecordBatch {
    /// Creates an empty batch bound to `max_bytes`.
    #[must_use]
    pub const fn new(target: RoutedTarget, max_bytes: usize) -> Self {
        Self {
            target,
            max_bytes,
            records: Vec::new(),
            byte_size: 0,
        }
    }

    /// Tries to append a record.
    ///
    /// Returns true if the record fit and was appended; false if adding
    /// it would exceed the byte bound, in which case the batch is
    /// unchanged. A false return is normal control flow, not an error.
    pub fn try_add(&mut self, record: &Record) -> bool {
        let size = record.encoded_size();
        if self.byte_size + size > self.max_bytes {
            return false;
        }
        self.byte_size += size;
        self.records.push(record.clone());
        true
    }

    /// Returns the batch's target.
    #[must_use]
    pub const fn target(&self) -> &RoutedTarget {
        &self.target
    }

    /// Returns true if the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of records in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns the cumulative serialized record size in bytes.
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Seals the batch into its wire payload: a record count followed by
    /// the record frames.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Record count bounded by limits.
    pub fn sealed_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.byte_size);
        buf.put_u32_le(self.records.len() as u32);
        for record in &self.records {
            record.encode(&mut buf);
        }
        buf.freeze()
    }

    /// Decodes a sealed batch payload back into records.
    ///
    /// Returns `None` on a malformed or truncated payload.
    #[must_use]
    pub fn decode_sealed(payload: &Bytes) -> Option<Vec<Record>> {
        let mut buf = payload.clone();
        if buf.remaining() < 4 {
            return None;
        }
        let count = buf.get_u32_le() as usize;
        // Cap the pre-allocation by the bytes actually present so a
        // malformed count cannot trigger a huge allocation.
        let mut records = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            records.push(Record::decode(&mut buf)?);
        }
        if buf.has_remaining() {
            return None;
        }
        Some(records)
    }
}
