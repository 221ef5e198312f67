//! librdkafka producer behind the [`Producer`] seam.
//!
//! Records are handed to a [`ThreadedProducer`], whose background thread
//! polls the client and feeds delivery reports and client errors into the
//! delivery event channel. Blocking client calls (metadata, flush) run on
//! the blocking pool so request tasks are never stalled.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use ferry_core::{
    delivery_channel, DeliveryEvent, DeliveryEvents, EventSender, FerryError, OutboundRecord,
    PartitionSelector, Producer, Result,
};
use rdkafka::{
    client::ClientContext,
    error::{KafkaError, RDKafkaErrorCode},
    message::Message,
    producer::{BaseRecord, DeliveryResult, Producer as _, ProducerContext, ThreadedProducer},
};
use tracing::{debug, info, warn};

use crate::{config::ProducerConfig, error::ConfigError};

/// Client context that turns librdkafka callbacks into delivery events.
struct DeliveryContext {
    events: EventSender,
}

impl ClientContext for DeliveryContext {
    fn error(&self, error: KafkaError, reason: &str) {
        self.events.send(DeliveryEvent::BrokerError {
            code: error_code(&error),
            description: reason.to_string(),
        });
    }
}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        let event = match result {
            Ok(message) => DeliveryEvent::Success {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
            },
            Err((error, message)) => DeliveryEvent::MessageError {
                topic: message.topic().to_string(),
                partition: message.partition(),
                code: error_code(error),
                description: error.to_string(),
            },
        };

        if !self.events.send(event) {
            debug!("delivery event dropped, monitor is gone");
        }
    }
}

/// Kafka producer safe for concurrent use without external locking.
///
/// Cloning is cheap and every clone shares the same client and event
/// channel.
#[derive(Clone)]
pub struct KafkaProducer {
    inner: Arc<ThreadedProducer<DeliveryContext>>,
    events: EventSender,
}

impl KafkaProducer {
    /// Builds the client from a validated configuration.
    ///
    /// Returns the producer together with the single consumer of its
    /// delivery events.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Client` if librdkafka rejects the settings.
    pub fn configure(config: &ProducerConfig) -> std::result::Result<(Self, DeliveryEvents), ConfigError> {
        let (events, receiver) = delivery_channel();
        let context = DeliveryContext { events: events.clone() };

        let producer: ThreadedProducer<DeliveryContext> = config
            .client_config()
            .create_with_context(context)
            .map_err(|e| ConfigError::Client { message: e.to_string() })?;

        info!(
            brokers = %config.brokers().join(","),
            compression = config.compression().as_str(),
            security_protocol = config.security_protocol().map_or("default", |p| p.as_str()),
            tls = config.tls().is_some(),
            sasl = config.sasl().is_some(),
            "kafka producer configured"
        );

        Ok((Self { inner: Arc::new(producer), events }, receiver))
    }

    /// Number of records queued or awaiting acknowledgment.
    pub fn in_flight_count(&self) -> i32 {
        self.inner.in_flight_count()
    }
}

impl fmt::Debug for KafkaProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaProducer")
            .field("in_flight", &self.in_flight_count())
            .field("closed", &self.events.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    fn produce(&self, record: OutboundRecord) -> Result<()> {
        if self.events.is_closed() {
            return Err(FerryError::ProducerClosed);
        }

        let mut base = BaseRecord::<[u8], [u8]>::to(&record.topic).payload(&record.value[..]);
        if let Some(key) = record.key.as_deref() {
            base = base.key(key);
        }
        if let PartitionSelector::Explicit(partition) = record.partition {
            base = base.partition(partition);
        }

        self.inner.send(base).map_err(|(error, _)| enqueue_error(&error))
    }

    async fn partition_count(&self, topic: &str, timeout: Duration) -> Result<i32> {
        let producer = Arc::clone(&self.inner);
        let name = topic.to_string();

        let fetched = tokio::task::spawn_blocking(move || {
            producer.client().fetch_metadata(Some(name.as_str()), timeout).map(|metadata| {
                metadata.topics().iter().find(|t| t.name() == name).map(|t| {
                    (t.error().map(RDKafkaErrorCode::from), t.partitions().len())
                })
            })
        })
        .await
        .map_err(|e| FerryError::Other(e.into()))?;

        match fetched {
            Err(error) if error.rdkafka_error_code() == Some(RDKafkaErrorCode::OperationTimedOut) => {
                Err(FerryError::MetadataTimeout { topic: topic.to_string(), attempts: 1 })
            },
            Err(error) => Err(FerryError::Metadata { topic: topic.to_string(), message: error.to_string() }),
            Ok(None) | Ok(Some((None, 0))) => Err(FerryError::TopicNotFound { topic: topic.to_string() }),
            Ok(Some((Some(code), _))) => Err(topic_error(topic, code)),
            Ok(Some((None, count))) => i32::try_from(count).map_err(|_| FerryError::Metadata {
                topic: topic.to_string(),
                message: format!("partition count {count} out of range"),
            }),
        }
    }

    async fn close(&self, timeout: Duration) -> Result<()> {
        let producer = Arc::clone(&self.inner);
        let flushed = tokio::task::spawn_blocking(move || producer.flush(timeout)).await;

        // The event sequence ends even if the flush did not complete.
        self.events.close();

        match flushed {
            Ok(Ok(())) => {
                info!("kafka producer flushed and closed");
                Ok(())
            },
            Ok(Err(error)) => {
                let remaining = self.in_flight_count();
                warn!(remaining, error = %error, "kafka producer closed before flush completed");
                Err(FerryError::Produce {
                    message: format!("flush did not complete, {remaining} records still queued: {error}"),
                })
            },
            Err(join) => Err(FerryError::Other(join.into())),
        }
    }
}

fn error_code(error: &KafkaError) -> String {
    error.rdkafka_error_code().map_or_else(|| "Unknown".to_string(), |code| format!("{code:?}"))
}

fn enqueue_error(error: &KafkaError) -> FerryError {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::QueueFull) => FerryError::QueueFull,
        _ => FerryError::Produce { message: error.to_string() },
    }
}

fn topic_error(topic: &str, code: RDKafkaErrorCode) -> FerryError {
    match code {
        RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic => {
            FerryError::TopicNotFound { topic: topic.to_string() }
        },
        other => FerryError::Metadata { topic: topic.to_string(), message: other.to_string() },
    }
}
