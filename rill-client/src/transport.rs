//! Broker transport seam.
//!
//! The broker is an external collaborator; this module defines the trait
//! it is consumed through, allowing different implementations for
//! production (network) and tests ([`crate::SimulatedBroker`]).
//!
//! # Implementation Notes
//!
//! Implementations must be `Send + Sync` for use across async tasks.
//! `receive` must return [`Receive::Timeout`] when the given wait
//! elapses with nothing to deliver; the consumer relies on this to check
//! deadline and cancellation at every suspension point.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rill_core::{ConcreteStart, PartitionId, PartitionMetadata, StreamedRecord};
use thiserror::Error;

use crate::router::RoutedTarget;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by the broker transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The partition id does not exist on the broker.
    #[error("unknown partition: {partition_id}")]
    UnknownPartition {
        /// The offending partition id.
        partition_id: PartitionId,
    },

    /// The broker could not be reached or did not respond in time.
    #[error("broker unavailable: {message}")]
    Unavailable {
        /// Error description.
        message: String,
    },

    /// The connection or subscription was closed by the broker.
    #[error("connection closed: {message}")]
    Closed {
        /// Error description.
        message: String,
    },

    /// An I/O level failure.
    #[error("I/O error during {operation}: {message}")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Error description.
        message: String,
    },
}

/// Outcome of a single subscription receive.
#[derive(Debug)]
pub enum Receive {
    /// A record arrived.
    Record(StreamedRecord),
    /// The wait elapsed with nothing to deliver.
    Timeout,
    /// The broker closed the subscription.
    Closed,
}

/// An open subscription to one partition.
#[async_trait]
pub trait Subscription: Send {
    /// Waits up to `timeout` for the next record.
    ///
    /// # Errors
    /// Returns an error on transport-level failure. A quiet partition is
    /// [`Receive::Timeout`], not an error.
    async fn receive(&mut self, timeout: Duration) -> TransportResult<Receive>;

    /// Releases the subscription.
    ///
    /// The consumer calls this exactly once per session; implementations
    /// must also release on drop so an abandoned handle does not leak.
    async fn close(&mut self);
}

/// Connection to the broker.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Lists the partition ids of the stream.
    ///
    /// # Errors
    /// Returns an error if the broker cannot be reached.
    async fn partition_ids(&self) -> TransportResult<Vec<PartitionId>>;

    /// Fetches a fresh metadata snapshot for one partition.
    ///
    /// # Errors
    /// Returns [`TransportError::UnknownPartition`] for a nonexistent id
    /// and [`TransportError::Unavailable`] on transient failure.
    async fn partition_metadata(
        &self,
        partition_id: PartitionId,
    ) -> TransportResult<PartitionMetadata>;

    /// Sends one sealed batch to the given target.
    ///
    /// # Errors
    /// Returns an error if the broker rejects or fails the send. Success
    /// means the batch is durably committed.
    async fn send(&self, target: &RoutedTarget, batch: Bytes) -> TransportResult<()>;

    /// Opens a subscription to one partition at a resolved start.
    ///
    /// # Errors
    /// Returns [`TransportError::UnknownPartition`] for a nonexistent id.
    async fn open_subscription(
        &self,
        partition_id: PartitionId,
        start: ConcreteStart,
    ) -> TransportResult<Box<dyn Subscription>>;
}
