//! Producer for publishing records to the stream.
//!
//! A publish call moves through `Idle -> Batching -> Sending` and ends
//! `Acknowledged` or `Failed`. The producer splits its input into
//! size-bounded batches, sends them sequentially, and on failure reports
//! exactly how many earlier batches the broker already committed.
//!
//! The producer holds no ordering guarantee across separate publish
//! calls; ordering within one call's batches is preserved, ordering
//! across concurrent calls is broker-dependent.

use std::sync::Arc;

use rill_core::{Limits, PartitionTarget, Record};
use tracing::{debug, warn};

use crate::batch::RecordBatch;
use crate::error::{ClientError, ClientResult};
use crate::router::route;
use crate::transport::BrokerTransport;

/// Configuration for the producer.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Maximum cumulative serialized record size per batch in bytes.
    pub max_batch_bytes: usize,
    /// Maximum number of records per batch.
    pub max_batch_records: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        let limits = Limits::new();
        Self {
            max_batch_bytes: limits.batch_bytes_max as usize,
            max_batch_records: limits.batch_records_max as usize,
        }
    }
}

/// Result of a fully acknowledged publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Number of batches sent and acknowledged.
    pub batches_sent: usize,
    /// Number of records sent and acknowledged.
    pub records_sent: usize,
}

/// Producer for writing records to the broker.
///
/// Cheap to share: publish takes `&self`, and concurrent calls for
/// different targets proceed independently if the transport multiplexes.
pub struct Producer {
    /// Broker connection.
    transport: Arc<dyn BrokerTransport>,
    /// Configuration.
    config: ProducerConfig,
}

impl Producer {
    /// Creates a producer over the given transport with default
    /// configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        Self::with_config(transport, ProducerConfig::default())
    }

    /// Creates a producer with custom configuration.
    #[must_use]
    pub fn with_config(transport: Arc<dyn BrokerTransport>, config: ProducerConfig) -> Self {
        Self { transport, config }
    }

    /// Returns the producer configuration.
    #[must_use]
    pub const fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Publishes a sequence of records to one target.
    ///
    /// Records are grouped into one or more batches, all sharing the
    /// same normalized target — a routing-key publish never splits its
    /// input across two keys. Batches are sent sequentially; the call
    /// succeeds only if every batch is acknowledged.
    ///
    /// # Errors
    ///
    /// - [`ClientError::RecordTooLarge`] if a single record cannot fit an
    ///   empty batch; nothing is sent.
    /// - [`ClientError::Publish`] if a batch send fails, reporting the
    ///   failed batch index and how many earlier batches the broker
    ///   already committed.
    pub async fn publish(
        &self,
        records: Vec<Record>,
        target: PartitionTarget,
    ) -> ClientResult<PublishReceipt> {
        let routed = route(target);
        let batches = self.build_batches(records, &routed)?;

        let mut records_sent = 0;
        let total = batches.len();
        for (batch_index, batch) in batches.iter().enumerate() {
            match self.transport.send(batch.target(), batch.sealed_bytes()).await {
                Ok(()) => {
                    records_sent += batch.len();
                    debug!(
                        batch_index,
                        records = batch.len(),
                        bytes = batch.byte_size(),
                        "batch acknowledged"
                    );
                }
                Err(source) => {
                    warn!(batch_index, batches_sent = batch_index, %source, "batch send failed");
                    return Err(ClientError::Publish {
                        batch_index,
                        batches_sent: batch_index,
                        source,
                    });
                }
            }
        }

        Ok(PublishReceipt {
            batches_sent: total,
            records_sent,
        })
    }

    /// Splits records into size-bounded batches sharing one target.
    fn build_batches(
        &self,
        records: Vec<Record>,
        routed: &crate::router::RoutedTarget,
    ) -> ClientResult<Vec<RecordBatch>> {
        let mut batches = Vec::new();
        let mut current = RecordBatch::new(routed.clone(), self.config.max_batch_bytes);

        for (index, record) in records.iter().enumerate() {
            let size = record.encoded_size();
            if size > self.config.max_batch_bytes {
                return Err(ClientError::RecordTooLarge {
                    index,
                    size,
                    max: self.config.max_batch_bytes,
                });
            }

            if current.len() >= self.config.max_batch_records || !current.try_add(record) {
                // Seal the full batch and start a fresh one.
                if !current.is_empty() {
                    batches.push(std::mem::replace(
                        &mut current,
                        RecordBatch::new(routed.clone(), self.config.max_batch_bytes),
                    ));
                }
                let added = current.try_add(record);
                debug_assert!(added, "record within bounds must fit an empty batch");
            }
        }

        if !current.is_empty() {
            batches.push(current);
        }
        Ok(batches)
    }
}
