//! Record types for the Rill event-stream client.
//!
//! A [`Record`] is what a caller hands to the producer: an immutable
//! payload plus an optional routing key. It has no identity until the
//! broker enqueues it; once accepted into a batch it is ordered relative
//! to the other records in that batch.
//!
//! A [`StreamedRecord`] is what the consumer yields: the decoded record
//! plus the partition id, sequence number, and enqueue timestamp the
//! broker assigned.
//!
//! # Wire Frames
//!
//! Records travel inside batches as length-prefixed frames:
//! routing key (i32 length, -1 for absent) followed by the payload
//! (u32 length). Sequence numbers and timestamps are broker-assigned and
//! never appear in the producer-side frame.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{PartitionId, SequenceNumber};

/// Timestamp in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the current time as a timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Timestamps won't overflow i64 for centuries.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }
}

/// A record to be published: an immutable payload plus an optional
/// routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Optional routing key. The broker maps equal keys to the same
    /// partition for the lifetime of the partition set.
    pub routing_key: Option<String>,
    /// The record payload.
    pub payload: Bytes,
}

impl Record {
    /// Creates a new record with just a payload.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            routing_key: None,
            payload: payload.into(),
        }
    }

    /// Creates a new record with a routing key and payload.
    #[must_use]
    pub fn keyed(routing_key: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            routing_key: Some(routing_key.into()),
            payload: payload.into(),
        }
    }

    /// Returns the serialized size of this record's wire frame.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        let key_size = self.routing_key.as_ref().map_or(0, String::len);
        4 + key_size + 4 + self.payload.len()
    }

    /// Encodes the record frame into `buf`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)] // Sizes bounded by limits.
    pub fn encode(&self, buf: &mut BytesMut) {
        match &self.routing_key {
            Some(key) => {
                buf.put_i32_le(key.len() as i32);
                buf.put_slice(key.as_bytes());
            }
            None => {
                buf.put_i32_le(-1);
            }
        }
        buf.put_u32_le(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Decodes a record frame from `buf`.
    ///
    /// Returns `None` if the buffer is truncated or the routing key is
    /// not valid UTF-8.
    #[allow(clippy::cast_sign_loss)] // key_len is checked to be non-negative before cast.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < 4 {
            return None;
        }
        let key_len = buf.get_i32_le();
        let routing_key = if key_len < 0 {
            None
        } else {
            if buf.remaining() < key_len as usize {
                return None;
            }
            let raw = buf.copy_to_bytes(key_len as usize);
            Some(String::from_utf8(raw.to_vec()).ok()?)
        };

        if buf.remaining() < 4 {
            return None;
        }
        let payload_len = buf.get_u32_le() as usize;
        if buf.remaining() < payload_len {
            return None;
        }
        let payload = buf.copy_to_bytes(payload_len);

        Some(Self {
            routing_key,
            payload,
        })
    }
}

/// Where a batch of records should land.
///
/// A batch has exactly one target, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionTarget {
    /// No explicit partition; the broker load-balances.
    Any,
    /// Broker deterministically maps the key to a partition. Equal keys
    /// always resolve to the same partition for the lifetime of the
    /// partition set. An empty key is equivalent to `Any`.
    RoutingKey(String),
    /// Explicit partition. The id must be a value previously observed
    /// from partition metadata; existence is validated by the transport.
    Partition(PartitionId),
}

/// Logical starting point for a consumer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Start from the first record still in the partition.
    Beginning,
    /// Start strictly after the last record enqueued at resolution time.
    ///
    /// There is an inherent race between the metadata fetch that resolves
    /// this position and the subscription open: records enqueued in that
    /// window may or may not be observed.
    Latest,
    /// Resume strictly after a caller-supplied sequence number.
    AfterSequenceNumber(SequenceNumber),
}

/// A resolved, exclusive start position for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcreteStart {
    /// Read everything the partition still holds.
    Beginning,
    /// Read only records with a sequence number strictly greater than
    /// the given one.
    After(SequenceNumber),
}

impl ConcreteStart {
    /// Returns true if a record at `sequence_number` falls after this
    /// start position.
    #[must_use]
    pub fn admits(self, sequence_number: SequenceNumber) -> bool {
        match self {
            Self::Beginning => true,
            Self::After(after) => sequence_number > after,
        }
    }
}

/// Read-only snapshot of a partition's state.
///
/// Fetched on demand and never cached across calls; broker state changes
/// continuously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMetadata {
    /// The partition this snapshot describes.
    pub partition_id: PartitionId,
    /// First sequence number still held, `None` if the partition is empty.
    pub beginning_sequence_number: Option<SequenceNumber>,
    /// Last enqueued sequence number, `None` if the partition is empty.
    pub last_enqueued_sequence_number: Option<SequenceNumber>,
}

impl PartitionMetadata {
    /// Returns true if the partition holds no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.last_enqueued_sequence_number.is_none()
    }
}

/// A record yielded by a consumer session.
///
/// Owned by the caller once yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamedRecord {
    /// Partition the record was read from.
    pub partition_id: PartitionId,
    /// Broker-assigned position within the partition.
    pub sequence_number: SequenceNumber,
    /// When the broker enqueued the record.
    pub enqueued_at: Timestamp,
    /// Routing key the record was published under, if any.
    pub routing_key: Option<String>,
    /// The record payload.
    pub payload: Bytes,
}
