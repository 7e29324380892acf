//! In-memory simulated broker.
//!
//! A fidelity-matched fake of the external broker for tests: it assigns
//! sequence numbers per partition, owns the routing-key hash ("same key,
//! same partition" is its guarantee, not the client's), round-robins
//! untargeted sends, and supports fault injection plus probes for
//! resource-release assertions.
//!
//! # Cloning
//!
//! Clones share the same underlying state (via `Arc`), so a test can
//! hold one handle while the client under test holds another.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rill_core::{
    ConcreteStart, PartitionId, PartitionMetadata, Record, SequenceNumber, StreamedRecord,
    Timestamp,
};

use crate::batch::RecordBatch;
use crate::router::RoutedTarget;
use crate::transport::{
    BrokerTransport, Receive, Subscription, TransportError, TransportResult,
};

/// How often a simulated subscription re-checks its partition log.
const RECEIVE_POLL: Duration = Duration::from_millis(2);

/// Fault injection switches for the simulated broker.
#[derive(Debug, Default)]
pub struct SimulatedFaults {
    /// If true, the next metadata fetch fails (one-shot).
    fail_metadata: bool,
    /// Zero-based send indices that fail.
    fail_sends: HashSet<usize>,
    /// Partitions whose subscriptions the broker has dropped.
    dropped_subscriptions: HashSet<u64>,
}

impl SimulatedFaults {
    /// Arms a one-shot metadata failure.
    pub fn fail_metadata_once(&mut self) {
        self.fail_metadata = true;
    }

    /// Fails the `index`-th send (zero-based, counted across all sends).
    pub fn fail_send_at(&mut self, index: usize) {
        self.fail_sends.insert(index);
    }

    /// Drops all current and future subscriptions on a partition.
    pub fn drop_subscription(&mut self, partition_id: PartitionId) {
        self.dropped_subscriptions.insert(partition_id.get());
    }
}

/// One acknowledged send, for routing assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendEntry {
    /// Target the client handed to the transport.
    pub target: RoutedTarget,
    /// Partition the broker resolved the send to.
    pub partition_id: PartitionId,
    /// Number of records in the batch.
    pub records: usize,
}

/// A record as stored by the broker.
#[derive(Debug, Clone)]
struct StoredRecord {
    routing_key: Option<String>,
    payload: Bytes,
    enqueued_at: Timestamp,
}

/// Shared broker state.
struct BrokerInner {
    /// Per-partition append-only logs; sequence number == index.
    partitions: Vec<Mutex<Vec<StoredRecord>>>,
    /// Round-robin counter for untargeted sends.
    round_robin: AtomicUsize,
    /// Total sends attempted, for `fail_send_at`.
    send_counter: AtomicUsize,
    /// Fault switches.
    faults: Mutex<SimulatedFaults>,
    /// Acknowledged sends.
    send_log: Mutex<Vec<SendEntry>>,
    /// Currently open subscriptions.
    open_subscriptions: AtomicUsize,
    /// Total `close` calls across all subscriptions.
    close_calls: AtomicUsize,
}

/// In-memory broker implementing [`BrokerTransport`].
pub struct SimulatedBroker {
    inner: Arc<BrokerInner>,
}

impl SimulatedBroker {
    /// Creates a broker with `partition_count` empty partitions.
    ///
    /// # Panics
    /// Panics if `partition_count` is zero.
    #[must_use]
    pub fn new(partition_count: usize) -> Self {
        assert!(partition_count > 0, "broker needs at least one partition");
        Self {
            inner: Arc::new(BrokerInner {
                partitions: (0..partition_count).map(|_| Mutex::new(Vec::new())).collect(),
                round_robin: AtomicUsize::new(0),
                send_counter: AtomicUsize::new(0),
                faults: Mutex::new(SimulatedFaults::default()),
                send_log: Mutex::new(Vec::new()),
                open_subscriptions: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Returns the fault switches for modification.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    pub fn faults(&self) -> MutexGuard<'_, SimulatedFaults> {
        self.inner.faults.lock().expect("faults lock poisoned")
    }

    /// Appends a record directly to a partition, bypassing the producer
    /// path. Returns the assigned sequence number.
    ///
    /// # Panics
    /// Panics if the partition does not exist.
    pub fn feed(&self, partition_id: PartitionId, payload: impl Into<Bytes>) -> SequenceNumber {
        self.append(
            partition_id,
            StoredRecord {
                routing_key: None,
                payload: payload.into(),
                enqueued_at: Timestamp::now(),
            },
        )
    }

    /// Appends a keyed record directly to a partition.
    ///
    /// # Panics
    /// Panics if the partition does not exist.
    pub fn feed_keyed(
        &self,
        partition_id: PartitionId,
        routing_key: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> SequenceNumber {
        self.append(
            partition_id,
            StoredRecord {
                routing_key: Some(routing_key.into()),
                payload: payload.into(),
                enqueued_at: Timestamp::now(),
            },
        )
    }

    /// Returns all acknowledged sends.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn send_log(&self) -> Vec<SendEntry> {
        self.inner.send_log.lock().expect("send log lock poisoned").clone()
    }

    /// Returns the number of currently open subscriptions.
    #[must_use]
    pub fn open_subscription_count(&self) -> usize {
        self.inner.open_subscriptions.load(Ordering::SeqCst)
    }

    /// Returns how many times `close` was called across all
    /// subscriptions.
    #[must_use]
    pub fn close_call_count(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    /// Returns the number of records a partition holds.
    ///
    /// # Panics
    /// Panics if the partition does not exist.
    #[must_use]
    pub fn record_count(&self, partition_id: PartitionId) -> usize {
        self.partition(partition_id)
            .expect("partition exists")
            .lock()
            .expect("partition lock poisoned")
            .len()
    }

    #[allow(clippy::cast_possible_truncation)] // Partition count is small.
    fn partition(&self, partition_id: PartitionId) -> Option<&Mutex<Vec<StoredRecord>>> {
        self.inner.partitions.get(partition_id.get() as usize)
    }

    fn append(&self, partition_id: PartitionId, record: StoredRecord) -> SequenceNumber {
        let mutex = self.partition(partition_id).expect("partition exists");
        let mut records = mutex.lock().expect("partition lock poisoned");
        records.push(record);
        SequenceNumber::new(records.len() as u64 - 1)
    }

    /// Resolves a routed target to a partition, mirroring the broker's
    /// ownership of key hashing.
    fn resolve_partition(&self, target: &RoutedTarget) -> TransportResult<PartitionId> {
        let count = self.inner.partitions.len();
        match target {
            RoutedTarget::Any => {
                let index = self.inner.round_robin.fetch_add(1, Ordering::SeqCst) % count;
                Ok(PartitionId::new(index as u64))
            }
            RoutedTarget::Key(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                Ok(PartitionId::new(hasher.finish() % count as u64))
            }
            RoutedTarget::Partition(partition_id) => {
                if self.partition(*partition_id).is_none() {
                    return Err(TransportError::UnknownPartition {
                        partition_id: *partition_id,
                    });
                }
                Ok(*partition_id)
            }
        }
    }
}

impl Clone for SimulatedBroker {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for SimulatedBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBroker")
            .field("partitions", &self.inner.partitions.len())
            .field("open_subscriptions", &self.open_subscription_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerTransport for SimulatedBroker {
    async fn partition_ids(&self) -> TransportResult<Vec<PartitionId>> {
        Ok((0..self.inner.partitions.len() as u64)
            .map(PartitionId::new)
            .collect())
    }

    async fn partition_metadata(
        &self,
        partition_id: PartitionId,
    ) -> TransportResult<PartitionMetadata> {
        {
            let mut faults = self.inner.faults.lock().expect("faults lock poisoned");
            if faults.fail_metadata {
                faults.fail_metadata = false;
                return Err(TransportError::Unavailable {
                    message: "simulated metadata failure".to_string(),
                });
            }
        }

        let mutex = self
            .partition(partition_id)
            .ok_or(TransportError::UnknownPartition { partition_id })?;
        let records = mutex.lock().expect("partition lock poisoned");

        let last = records
            .len()
            .checked_sub(1)
            .map(|index| SequenceNumber::new(index as u64));
        Ok(PartitionMetadata {
            partition_id,
            beginning_sequence_number: last.map(|_| SequenceNumber::new(0)),
            last_enqueued_sequence_number: last,
        })
    }

    async fn send(&self, target: &RoutedTarget, batch: Bytes) -> TransportResult<()> {
        let send_index = self.inner.send_counter.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = self.inner.faults.lock().expect("faults lock poisoned");
            if faults.fail_sends.remove(&send_index) {
                return Err(TransportError::Unavailable {
                    message: format!("simulated send failure at {send_index}"),
                });
            }
        }

        let records = RecordBatch::decode_sealed(&batch).ok_or(TransportError::Io {
            operation: "send",
            message: "malformed batch payload".to_string(),
        })?;

        let partition_id = self.resolve_partition(target)?;
        let count = records.len();
        for Record {
            routing_key,
            payload,
        } in records
        {
            // A send-level key applies to every record in the batch.
            let key = match target {
                RoutedTarget::Key(key) => Some(key.clone()),
                _ => routing_key,
            };
            self.append(
                partition_id,
                StoredRecord {
                    routing_key: key,
                    payload,
                    enqueued_at: Timestamp::now(),
                },
            );
        }

        self.inner
            .send_log
            .lock()
            .expect("send log lock poisoned")
            .push(SendEntry {
                target: target.clone(),
                partition_id,
                records: count,
            });
        Ok(())
    }

    async fn open_subscription(
        &self,
        partition_id: PartitionId,
        start: ConcreteStart,
    ) -> TransportResult<Box<dyn Subscription>> {
        if self.partition(partition_id).is_none() {
            return Err(TransportError::UnknownPartition { partition_id });
        }

        #[allow(clippy::cast_possible_truncation)] // Test logs stay small.
        let next_index = match start {
            ConcreteStart::Beginning => 0,
            ConcreteStart::After(seq) => seq.get().saturating_add(1) as usize,
        };

        self.inner.open_subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedSubscription {
            partition_id,
            inner: Arc::clone(&self.inner),
            next_index,
            released: false,
        }))
    }
}

/// Subscription over one simulated partition.
struct SimulatedSubscription {
    partition_id: PartitionId,
    inner: Arc<BrokerInner>,
    /// Next log index to deliver; sequence number == index.
    next_index: usize,
    /// Whether the open-subscription count has been given back.
    released: bool,
}

impl SimulatedSubscription {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.inner.open_subscriptions.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_dropped(&self) -> bool {
        self.inner
            .faults
            .lock()
            .expect("faults lock poisoned")
            .dropped_subscriptions
            .contains(&self.partition_id.get())
    }

    fn try_take(&mut self) -> Option<StreamedRecord> {
        #[allow(clippy::cast_possible_truncation)] // Partition count is small.
        let mutex = &self.inner.partitions[self.partition_id.get() as usize];
        let records = mutex.lock().expect("partition lock poisoned");
        let stored = records.get(self.next_index)?;
        let record = StreamedRecord {
            partition_id: self.partition_id,
            sequence_number: SequenceNumber::new(self.next_index as u64),
            enqueued_at: stored.enqueued_at,
            routing_key: stored.routing_key.clone(),
            payload: stored.payload.clone(),
        };
        self.next_index += 1;
        Some(record)
    }
}

#[async_trait]
impl Subscription for SimulatedSubscription {
    async fn receive(&mut self, timeout: Duration) -> TransportResult<Receive> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.released || self.is_dropped() {
                return Ok(Receive::Closed);
            }
            if let Some(record) = self.try_take() {
                return Ok(Receive::Record(record));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Receive::Timeout);
            }
            tokio::time::sleep(RECEIVE_POLL.min(timeout)).await;
        }
    }

    async fn close(&mut self) {
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        self.release();
    }
}

impl Drop for SimulatedSubscription {
    fn drop(&mut self) {
        // Backstop for handles abandoned without an explicit close.
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_feed_assigns_sequence_numbers() {
        let broker = SimulatedBroker::new(1);
        let partition = PartitionId::new(0);

        assert_eq!(broker.feed(partition, "a"), SequenceNumber::new(0));
        assert_eq!(broker.feed(partition, "b"), SequenceNumber::new(1));
        assert_eq!(broker.record_count(partition), 2);
    }

    #[tokio::test]
    async fn test_metadata_reflects_log() {
        let broker = SimulatedBroker::new(1);
        let partition = PartitionId::new(0);

        let metadata = broker.partition_metadata(partition).await.unwrap();
        assert!(metadata.is_empty());

        broker.feed(partition, "a");
        broker.feed(partition, "b");

        let metadata = broker.partition_metadata(partition).await.unwrap();
        assert_eq!(
            metadata.last_enqueued_sequence_number,
            Some(SequenceNumber::new(1))
        );
        assert_eq!(
            metadata.beginning_sequence_number,
            Some(SequenceNumber::new(0))
        );
    }

    #[tokio::test]
    async fn test_send_round_robins_untargeted_batches() {
        let broker = SimulatedBroker::new(3);
        let mut batch = RecordBatch::new(RoutedTarget::Any, 1024);
        assert!(batch.try_add(&Record::new("x")));
        let payload = batch.sealed_bytes();

        for _ in 0..3 {
            broker.send(&RoutedTarget::Any, payload.clone()).await.unwrap();
        }

        let partitions: Vec<_> = broker.send_log().iter().map(|e| e.partition_id).collect();
        assert_eq!(
            partitions,
            vec![PartitionId::new(0), PartitionId::new(1), PartitionId::new(2)]
        );
    }

    #[tokio::test]
    async fn test_same_key_same_partition() {
        let broker = SimulatedBroker::new(8);
        let target = RoutedTarget::Key("device-1".to_string());
        let mut batch = RecordBatch::new(target.clone(), 1024);
        assert!(batch.try_add(&Record::new("x")));
        let payload = batch.sealed_bytes();

        broker.send(&target, payload.clone()).await.unwrap();
        broker.send(&target, payload).await.unwrap();

        let log = broker.send_log();
        assert_eq!(log[0].partition_id, log[1].partition_id);
    }

    #[tokio::test]
    async fn test_send_rejects_malformed_batch() {
        let broker = SimulatedBroker::new(1);
        let err = broker
            .send(&RoutedTarget::Any, Bytes::from_static(b"junk"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io { .. }));
    }

    #[tokio::test]
    async fn test_fail_send_at_is_one_shot() {
        let broker = SimulatedBroker::new(1);
        broker.faults().fail_send_at(0);

        let mut batch = RecordBatch::new(RoutedTarget::Any, 1024);
        assert!(batch.try_add(&Record::new("x")));
        let payload = batch.sealed_bytes();

        let err = broker.send(&RoutedTarget::Any, payload.clone()).await;
        assert!(matches!(err, Err(TransportError::Unavailable { .. })));

        broker.send(&RoutedTarget::Any, payload).await.unwrap();
    }

    #[tokio::test]
    async fn test_subscription_lifecycle_counts() {
        let broker = SimulatedBroker::new(1);
        let partition = PartitionId::new(0);
        broker.feed(partition, "a");

        let mut subscription = broker
            .open_subscription(partition, ConcreteStart::Beginning)
            .await
            .unwrap();
        assert_eq!(broker.open_subscription_count(), 1);

        let outcome = subscription.receive(Duration::from_millis(50)).await.unwrap();
        assert!(matches!(outcome, Receive::Record(_)));

        subscription.close().await;
        assert_eq!(broker.open_subscription_count(), 0);
        assert_eq!(broker.close_call_count(), 1);

        // A closed subscription reports itself closed.
        let outcome = subscription.receive(Duration::from_millis(10)).await.unwrap();
        assert!(matches!(outcome, Receive::Closed));
    }

    #[tokio::test]
    async fn test_subscription_drop_releases_without_close() {
        let broker = SimulatedBroker::new(1);
        let subscription = broker
            .open_subscription(PartitionId::new(0), ConcreteStart::Beginning)
            .await
            .unwrap();
        assert_eq!(broker.open_subscription_count(), 1);

        drop(subscription);
        assert_eq!(broker.open_subscription_count(), 0);
        assert_eq!(broker.close_call_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_times_out_on_quiet_partition() {
        let broker = SimulatedBroker::new(1);
        let mut subscription = broker
            .open_subscription(PartitionId::new(0), ConcreteStart::Beginning)
            .await
            .unwrap();

        let outcome = subscription.receive(Duration::from_millis(20)).await.unwrap();
        assert!(matches!(outcome, Receive::Timeout));
        subscription.close().await;
    }
}
