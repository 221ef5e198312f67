//! In-memory broker implementing the [`Producer`] seam.
//!
//! Produced records are captured in order and stay pending until the test
//! acknowledges or fails them, so tests control exactly when delivery
//! events appear. The produce path only touches atomics and an unbounded
//! channel, which keeps it free of any lock shared between callers.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use ferry_core::{
    delivery_channel, DeliveryEvent, DeliveryEvents, EventSender, FerryError, OutboundRecord,
    PartitionSelector, Producer, Result,
};
use tokio::sync::mpsc;

/// Builder for [`MockProducer`].
#[derive(Debug, Default)]
pub struct MockProducerBuilder {
    topics: HashMap<String, i32>,
    queue_capacity: Option<usize>,
    metadata_failures: u32,
    metadata_delay: Option<Duration>,
    auto_acknowledge: bool,
}

impl MockProducerBuilder {
    /// Registers a topic with `partition_count` partitions.
    #[must_use]
    pub fn topic(mut self, name: impl Into<String>, partition_count: i32) -> Self {
        self.topics.insert(name.into(), partition_count);
        self
    }

    /// Rejects produce with `QueueFull` once `capacity` records are pending.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Fails the first `count` metadata requests with a broker error.
    #[must_use]
    pub fn metadata_failures(mut self, count: u32) -> Self {
        self.metadata_failures = count;
        self
    }

    /// Delays every metadata response by `delay`.
    #[must_use]
    pub fn metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = Some(delay);
        self
    }

    /// Emits `Success` for every record as soon as it is produced.
    #[must_use]
    pub fn auto_acknowledge(mut self) -> Self {
        self.auto_acknowledge = true;
        self
    }

    /// Builds the producer and the consumer of its delivery events.
    pub fn build(self) -> (MockProducer, DeliveryEvents) {
        let (events, receiver) = delivery_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        let inner = Inner {
            topics: self.topics,
            queue_capacity: self.queue_capacity,
            metadata_failures: AtomicU32::new(self.metadata_failures),
            metadata_delay: self.metadata_delay,
            auto_acknowledge: self.auto_acknowledge,
            events,
            sent_tx,
            sent: Mutex::new(Sent { rx: sent_rx, records: Vec::new(), settled: 0 }),
            pending: AtomicUsize::new(0),
            produced: AtomicU64::new(0),
            metadata_requests: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        };

        (MockProducer { inner: Arc::new(inner) }, receiver)
    }
}

struct Sent {
    rx: mpsc::UnboundedReceiver<OutboundRecord>,
    records: Vec<OutboundRecord>,
    settled: usize,
}

impl Sent {
    fn drain(&mut self) {
        while let Ok(record) = self.rx.try_recv() {
            self.records.push(record);
        }
    }
}

struct Inner {
    topics: HashMap<String, i32>,
    queue_capacity: Option<usize>,
    metadata_failures: AtomicU32,
    metadata_delay: Option<Duration>,
    auto_acknowledge: bool,
    events: EventSender,
    sent_tx: mpsc::UnboundedSender<OutboundRecord>,
    sent: Mutex<Sent>,
    pending: AtomicUsize,
    produced: AtomicU64,
    metadata_requests: AtomicU32,
    closed: AtomicBool,
}

/// In-memory producer with controllable acknowledgments.
#[derive(Clone)]
pub struct MockProducer {
    inner: Arc<Inner>,
}

impl MockProducer {
    /// Starts building a mock producer with no topics.
    pub fn builder() -> MockProducerBuilder {
        MockProducerBuilder::default()
    }

    /// All records produced so far, in enqueue order.
    pub fn records(&self) -> Vec<OutboundRecord> {
        let mut sent = self.lock_sent();
        sent.drain();
        sent.records.clone()
    }

    /// Number of successful produce calls.
    pub fn produced_count(&self) -> u64 {
        self.inner.produced.load(Ordering::SeqCst)
    }

    /// Number of records not yet acknowledged or failed.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Number of metadata requests received.
    pub fn metadata_requests(&self) -> u32 {
        self.inner.metadata_requests.load(Ordering::SeqCst)
    }

    /// Emits `Success` for every pending record. Returns how many were
    /// acknowledged.
    pub fn acknowledge(&self) -> usize {
        self.settle(|record, offset| DeliveryEvent::Success {
            topic: record.topic.clone(),
            partition: assigned_partition(record.partition),
            offset,
        })
    }

    /// Emits `MessageError` for every pending record. Returns how many
    /// failed.
    pub fn fail_pending(&self, code: &str, description: &str) -> usize {
        self.settle(|record, _| DeliveryEvent::MessageError {
            topic: record.topic.clone(),
            partition: assigned_partition(record.partition),
            code: code.to_string(),
            description: description.to_string(),
        })
    }

    /// Emits a connection-level error.
    pub fn broker_error(&self, code: &str, description: &str) {
        self.inner.events.send(DeliveryEvent::BrokerError {
            code: code.to_string(),
            description: description.to_string(),
        });
    }

    fn settle(&self, event_for: impl Fn(&OutboundRecord, i64) -> DeliveryEvent) -> usize {
        let mut sent = self.lock_sent();
        sent.drain();

        let start = sent.settled;
        for (index, record) in sent.records.iter().enumerate().skip(start) {
            let offset = i64::try_from(index).unwrap_or(i64::MAX);
            self.inner.events.send(event_for(record, offset));
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
        }
        sent.settled = sent.records.len();
        sent.settled - start
    }

    fn lock_sent(&self) -> std::sync::MutexGuard<'_, Sent> {
        self.inner.sent.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn assigned_partition(selector: PartitionSelector) -> i32 {
    selector.partition().unwrap_or(0)
}

impl fmt::Debug for MockProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProducer")
            .field("topics", &self.inner.topics)
            .field("produced", &self.produced_count())
            .field("pending", &self.pending_count())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl Producer for MockProducer {
    fn produce(&self, record: OutboundRecord) -> Result<()> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(FerryError::ProducerClosed);
        }

        let pending = inner.pending.fetch_add(1, Ordering::SeqCst);
        if inner.queue_capacity.is_some_and(|capacity| pending >= capacity) {
            inner.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(FerryError::QueueFull);
        }

        if inner.auto_acknowledge {
            let offset = i64::try_from(inner.produced.load(Ordering::SeqCst)).unwrap_or(i64::MAX);
            inner.events.send(DeliveryEvent::Success {
                topic: record.topic.clone(),
                partition: assigned_partition(record.partition),
                offset,
            });
            inner.pending.fetch_sub(1, Ordering::SeqCst);
        } else if inner.sent_tx.send(record).is_err() {
            inner.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(FerryError::Produce { message: "mock record sink dropped".to_string() });
        }

        inner.produced.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn partition_count(&self, topic: &str, _timeout: Duration) -> Result<i32> {
        let inner = &self.inner;
        inner.metadata_requests.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = inner.metadata_delay {
            tokio::time::sleep(delay).await;
        }

        let injected = inner
            .metadata_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            return Err(FerryError::Metadata {
                topic: topic.to_string(),
                message: "injected broker failure".to_string(),
            });
        }

        inner
            .topics
            .get(topic)
            .copied()
            .ok_or_else(|| FerryError::TopicNotFound { topic: topic.to_string() })
    }

    async fn close(&self, _timeout: Duration) -> Result<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.events.close();
        Ok(())
    }
}
