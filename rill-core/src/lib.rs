//! Rill Core - Types and payload codec for the Rill event-stream client.
//!
//! This crate defines the vocabulary shared by the producer and consumer
//! sides of the client:
//!
//! - Strongly-typed identifiers (`PartitionId`, `SequenceNumber`)
//! - The `Record` / `StreamedRecord` data model
//! - Partition targeting (`PartitionTarget`) and start positions
//!   (`StartPosition`, `ConcreteStart`)
//! - The reference sensor-reading payload codec
//! - Explicit client limits
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: a `SequenceNumber` is never a bare `u64`
//! - **Explicit limits**: every buffer and batch has a bounded maximum
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod reading;
mod record;
mod types;

pub use error::{CodecError, CodecResult, CoreError, CoreResult};
pub use limits::Limits;
pub use reading::SensorReading;
pub use record::{
    ConcreteStart, PartitionMetadata, PartitionTarget, Record, StartPosition, StreamedRecord,
    Timestamp,
};
pub use types::{PartitionId, SequenceNumber};
