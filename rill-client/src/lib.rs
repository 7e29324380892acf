//! Rill Client - Producer and consumer for a partitioned event stream.
//!
//! This crate is a client library over an already-durable partitioned
//! log owned by an external broker. It provides:
//!
//! - A [`Producer`] that groups records into size-bounded batches and
//!   publishes each batch either load-balanced across partitions or
//!   pinned via a routing key
//! - A [`Consumer`] that, per partition, resolves a starting position and
//!   streams records until cancellation or a deadline expires
//! - The [`BrokerTransport`] seam the broker is consumed through, plus an
//!   in-memory [`SimulatedBroker`] for tests
//!
//! # What this crate is not
//!
//! Durability, replication, authentication, and exactly-once delivery
//! belong to the broker. Delivery is at-least-once; retry policy is the
//! caller's decision, never applied internally.
//!
//! # Concurrency
//!
//! Partitions are read independently; one session per partition, no
//! cross-partition ordering. Each session carries its own cancellation
//! signal and absolute deadline, both checked at every suspension point.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod batch;
mod consumer;
mod cursor;
mod error;
mod producer;
mod router;
mod sim;
mod transport;

pub use batch::RecordBatch;
pub use consumer::{CancelHandle, Consumer, ConsumerConfig, PartitionStream};
pub use cursor::resolve_start;
pub use error::{ClientError, ClientResult};
pub use producer::{Producer, ProducerConfig, PublishReceipt};
pub use router::{route, RoutedTarget};
pub use sim::{SendEntry, SimulatedBroker, SimulatedFaults};
pub use transport::{BrokerTransport, Receive, Subscription, TransportError, TransportResult};
