//! Consumer sessions over single partitions.
//!
//! A session is opened per partition: the start policy is resolved
//! against fresh metadata, a subscription is opened at the resolved
//! position, and records are pulled lazily through
//! [`PartitionStream::next`] until the deadline elapses, cancellation is
//! requested, or the transport fails.
//!
//! # Termination
//!
//! Deadline expiry and cancellation end the stream cleanly (`None`,
//! never an error). A transport fault surfaces one
//! [`ClientError::Stream`] item and then ends the stream; resumption is
//! the caller's responsibility via
//! [`StartPosition::AfterSequenceNumber`] with the last seen sequence
//! number. On every exit path the subscription is released exactly once.
//!
//! # Ordering
//!
//! Sequence numbers yielded by one session strictly increase; records
//! replayed by an at-least-once transport are skipped. Sessions on
//! different partitions are independent, with no cross-partition
//! ordering.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use rill_core::{ConcreteStart, Limits, PartitionId, SequenceNumber, StartPosition, StreamedRecord};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cursor::resolve_start;
use crate::error::{ClientError, ClientResult};
use crate::transport::{BrokerTransport, Receive, Subscription, TransportError, TransportResult};

/// Configuration for the consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// How long a single transport receive waits before the session
    /// re-checks deadline and cancellation. Bounds how long a stuck
    /// receive can delay termination.
    pub receive_poll: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            receive_poll: Limits::new().receive_poll(),
        }
    }
}

/// Requests cancellation of one session.
///
/// Clones address the same session. Cancelling one session never
/// affects others.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Requests cancellation. The session terminates cleanly at its next
    /// suspension point.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Consumer for reading partitions of the stream.
pub struct Consumer {
    /// Broker connection.
    transport: Arc<dyn BrokerTransport>,
    /// Configuration.
    config: ConsumerConfig,
}

impl Consumer {
    /// Creates a consumer over the given transport with default
    /// configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        Self::with_config(transport, ConsumerConfig::default())
    }

    /// Creates a consumer with custom configuration.
    #[must_use]
    pub fn with_config(transport: Arc<dyn BrokerTransport>, config: ConsumerConfig) -> Self {
        Self { transport, config }
    }

    /// Opens a bounded-time session on one partition.
    ///
    /// Resolves `start` against fresh metadata, opens a subscription at
    /// the resolved position, and returns the lazy record sequence. The
    /// session ends at `deadline` from now unless cancelled or faulted
    /// earlier. Sessions are independent; open one per partition to read
    /// concurrently.
    ///
    /// # Errors
    ///
    /// - [`ClientError::UnknownPartition`] for a nonexistent id.
    /// - [`ClientError::MetadataUnavailable`] if resolution fails
    ///   transiently; safe to retry.
    /// - [`ClientError::Stream`] if the subscription cannot be opened.
    pub async fn open(
        &self,
        partition_id: PartitionId,
        start: StartPosition,
        deadline: Duration,
    ) -> ClientResult<PartitionStream> {
        let resolved = resolve_start(&*self.transport, partition_id, start).await?;

        let subscription = self
            .transport
            .open_subscription(partition_id, resolved)
            .await
            .map_err(|source| match source {
                TransportError::UnknownPartition { partition_id } => {
                    ClientError::UnknownPartition { partition_id }
                }
                other => ClientError::Stream { source: other },
            })?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        debug!(%partition_id, ?resolved, ?deadline, "session opened");

        Ok(PartitionStream {
            partition_id,
            subscription: Some(subscription),
            deadline: Instant::now() + deadline,
            receive_poll: self.config.receive_poll,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            cursor: resolved,
            last_yielded: None,
            finished: false,
        })
    }
}

/// One select round of the session loop.
enum Step {
    Cancelled,
    Outcome(TransportResult<Receive>),
}

/// A lazy, bounded-time sequence of records from one partition.
///
/// Not restartable: a new session re-resolves the cursor and may
/// re-observe or skip records depending on the policy chosen.
pub struct PartitionStream {
    /// Partition this session reads.
    partition_id: PartitionId,
    /// Open subscription; taken exactly once on termination.
    subscription: Option<Box<dyn Subscription>>,
    /// Absolute end of the session.
    deadline: Instant,
    /// Per-receive wait before re-checking deadline and cancellation.
    receive_poll: Duration,
    /// Cancellation signal shared with [`CancelHandle`]s.
    cancel_tx: Arc<watch::Sender<bool>>,
    /// Receiver side of the cancellation signal.
    cancel_rx: watch::Receiver<bool>,
    /// Exclusive lower bound for the next yielded record.
    cursor: ConcreteStart,
    /// Sequence number of the last record actually yielded.
    last_yielded: Option<SequenceNumber>,
    /// Set once the session has terminated and released its subscription.
    finished: bool,
}

impl PartitionStream {
    /// Returns the partition this session reads.
    #[must_use]
    pub const fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Returns a handle that cancels this session.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Returns the sequence number of the last yielded record, the
    /// resume point for a follow-up session.
    #[must_use]
    pub const fn last_seen(&self) -> Option<SequenceNumber> {
        self.last_yielded
    }

    /// Returns true once the session has terminated.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Yields the next record.
    ///
    /// Returns `None` on deadline expiry or cancellation (normal
    /// termination). Yields `Some(Err(ClientError::Stream))` once on a
    /// transport fault, after which the stream is finished.
    pub async fn next(&mut self) -> Option<ClientResult<StreamedRecord>> {
        loop {
            if self.finished {
                return None;
            }
            if *self.cancel_rx.borrow() {
                debug!(partition_id = %self.partition_id, "session cancelled");
                self.finish().await;
                return None;
            }
            let now = Instant::now();
            if now >= self.deadline {
                debug!(partition_id = %self.partition_id, "session deadline reached");
                self.finish().await;
                return None;
            }

            // Never wait past the deadline, and never longer than the
            // poll interval, so a stuck receive stays interruptible.
            let wait = self.receive_poll.min(self.deadline - now);

            let step = {
                let subscription = self
                    .subscription
                    .as_mut()
                    .expect("subscription present until finished");
                let mut cancel_rx = self.cancel_rx.clone();
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        // A send only ever flips the flag to true; a closed
                        // channel means the session owner is gone.
                        let _ = changed;
                        Step::Cancelled
                    }
                    outcome = subscription.receive(wait) => Step::Outcome(outcome),
                }
            };

            match step {
                Step::Cancelled => {
                    // Loop re-checks the flag and terminates cleanly.
                    if !*self.cancel_rx.borrow() {
                        self.finish().await;
                        return None;
                    }
                }
                Step::Outcome(Ok(Receive::Record(record))) => {
                    if !self.cursor.admits(record.sequence_number) {
                        trace!(
                            partition_id = %self.partition_id,
                            sequence_number = %record.sequence_number,
                            "skipping replayed record"
                        );
                        continue;
                    }
                    self.cursor = ConcreteStart::After(record.sequence_number);
                    self.last_yielded = Some(record.sequence_number);
                    return Some(Ok(record));
                }
                Step::Outcome(Ok(Receive::Timeout)) => {
                    // Quiet partition; loop re-checks deadline and
                    // cancellation.
                }
                Step::Outcome(Ok(Receive::Closed)) => {
                    self.finish().await;
                    return Some(Err(ClientError::Stream {
                        source: TransportError::Closed {
                            message: "subscription closed by broker".to_string(),
                        },
                    }));
                }
                Step::Outcome(Err(source)) => {
                    self.finish().await;
                    return Some(Err(ClientError::Stream { source }));
                }
            }
        }
    }

    /// Adapts the session into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = ClientResult<StreamedRecord>> {
        futures::stream::unfold(self, |mut session| async move {
            session.next().await.map(|item| (item, session))
        })
    }

    /// Terminates the session and releases the subscription.
    ///
    /// Idempotent; the `Option::take` guarantees the transport close is
    /// invoked at most once. Dropping the stream without draining it
    /// releases the subscription through the handle's own drop.
    async fn finish(&mut self) {
        self.finished = true;
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close().await;
            debug!(partition_id = %self.partition_id, "session closed");
        }
    }
}

impl std::fmt::Debug for PartitionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionStream")
            .field("partition_id", &self.partition_id)
            .field("cursor", &self.cursor)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::sim::SimulatedBroker;

    fn test_consumer(broker: &Arc<SimulatedBroker>) -> Consumer {
        Consumer::with_config(
            Arc::clone(broker) as Arc<dyn BrokerTransport>,
            ConsumerConfig {
                receive_poll: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn test_stream_from_beginning() {
        let broker = Arc::new(SimulatedBroker::new(1));
        let partition = PartitionId::new(0);
        broker.feed(partition, "a");
        broker.feed(partition, "b");
        broker.feed(partition, "c");

        let consumer = test_consumer(&broker);
        let mut stream = consumer
            .open(partition, StartPosition::Beginning, Duration::from_millis(200))
            .await
            .unwrap();

        for (i, expected) in ["a", "b", "c"].iter().enumerate() {
            let record = stream.next().await.unwrap().unwrap();
            assert_eq!(record.sequence_number, SequenceNumber::new(i as u64));
            assert_eq!(&record.payload[..], expected.as_bytes());
            assert_eq!(record.partition_id, partition);
        }

        // Nothing else arrives; the deadline ends the stream cleanly.
        assert!(stream.next().await.is_none());
        assert!(stream.is_finished());
        assert_eq!(stream.last_seen(), Some(SequenceNumber::new(2)));
        assert_eq!(broker.open_subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_from_latest_sees_only_new_records() {
        let broker = Arc::new(SimulatedBroker::new(1));
        let partition = PartitionId::new(0);
        broker.feed(partition, "old-1");
        broker.feed(partition, "old-2");

        let consumer = test_consumer(&broker);
        let mut stream = consumer
            .open(partition, StartPosition::Latest, Duration::from_secs(5))
            .await
            .unwrap();

        broker.feed(partition, "new");

        let record = stream.next().await.unwrap().unwrap();
        assert_eq!(&record.payload[..], b"new");
        assert_eq!(record.sequence_number, SequenceNumber::new(2));

        stream.cancel_handle().cancel();
        assert!(stream.next().await.is_none());
        assert_eq!(broker.open_subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_resume_after_sequence_number() {
        let broker = Arc::new(SimulatedBroker::new(1));
        let partition = PartitionId::new(0);
        for payload in ["a", "b", "c", "d"] {
            broker.feed(partition, payload);
        }

        let consumer = test_consumer(&broker);
        let mut stream = consumer
            .open(
                partition,
                StartPosition::AfterSequenceNumber(SequenceNumber::new(1)),
                Duration::from_millis(200),
            )
            .await
            .unwrap();

        let record = stream.next().await.unwrap().unwrap();
        assert_eq!(record.sequence_number, SequenceNumber::new(2));
        let record = stream.next().await.unwrap().unwrap();
        assert_eq!(record.sequence_number, SequenceNumber::new(3));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_from_another_task() {
        let broker = Arc::new(SimulatedBroker::new(1));
        let partition = PartitionId::new(0);

        let consumer = test_consumer(&broker);
        let mut stream = consumer
            .open(partition, StartPosition::Beginning, Duration::from_secs(60))
            .await
            .unwrap();

        let handle = stream.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            handle.cancel();
        });

        // The quiet partition never yields; cancellation ends the
        // stream cleanly well before the 60s deadline.
        assert!(stream.next().await.is_none());
        assert!(stream.is_finished());
        assert_eq!(broker.open_subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_fault_surfaces_stream_error() {
        let broker = Arc::new(SimulatedBroker::new(1));
        let partition = PartitionId::new(0);
        broker.feed(partition, "a");

        let consumer = test_consumer(&broker);
        let mut stream = consumer
            .open(partition, StartPosition::Beginning, Duration::from_secs(5))
            .await
            .unwrap();

        let record = stream.next().await.unwrap().unwrap();
        assert_eq!(&record.payload[..], b"a");

        broker.faults().drop_subscription(partition);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Stream { .. }));

        // The session is finished, not auto-resumed.
        assert!(stream.next().await.is_none());
        assert_eq!(broker.open_subscription_count(), 0);

        // The caller resumes explicitly from the last seen position.
        assert_eq!(stream.last_seen(), Some(SequenceNumber::new(0)));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let broker = Arc::new(SimulatedBroker::new(2));
        broker.feed(PartitionId::new(0), "p0");
        broker.feed(PartitionId::new(1), "p1");

        let consumer = test_consumer(&broker);
        let mut first = consumer
            .open(PartitionId::new(0), StartPosition::Beginning, Duration::from_secs(5))
            .await
            .unwrap();
        let mut second = consumer
            .open(PartitionId::new(1), StartPosition::Beginning, Duration::from_secs(5))
            .await
            .unwrap();

        // Cancelling one session never affects the other.
        first.cancel_handle().cancel();
        assert!(first.next().await.is_none());

        let record = second.next().await.unwrap().unwrap();
        assert_eq!(&record.payload[..], b"p1");
        second.cancel_handle().cancel();
        assert!(second.next().await.is_none());
        assert_eq!(broker.open_subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_into_stream_adapter() {
        let broker = Arc::new(SimulatedBroker::new(1));
        let partition = PartitionId::new(0);
        broker.feed(partition, "x");
        broker.feed(partition, "y");

        let consumer = test_consumer(&broker);
        let session = consumer
            .open(partition, StartPosition::Beginning, Duration::from_millis(150))
            .await
            .unwrap();

        let payloads: Vec<_> = session
            .into_stream()
            .map(|item| item.unwrap().payload)
            .collect()
            .await;
        assert_eq!(payloads, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_early_drop_releases_subscription() {
        let broker = Arc::new(SimulatedBroker::new(1));
        let partition = PartitionId::new(0);
        broker.feed(partition, "a");

        let consumer = test_consumer(&broker);
        let stream = consumer
            .open(partition, StartPosition::Beginning, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(broker.open_subscription_count(), 1);

        drop(stream);
        assert_eq!(broker.open_subscription_count(), 0);
    }
}
