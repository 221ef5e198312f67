//! Per-request routing, serialization and enqueue.
//!
//! The dispatcher is the transport-independent core of the receive
//! endpoint. It never waits for the broker: a successful return only means
//! the record reached the producer's send queue.

use std::{fmt, sync::Arc};

use ferry_core::{
    FerryError, InboundMessage, OutboundRecord, PartitionLabelTable, PartitionSelector, Producer,
    Result, Route, Serializer,
};
use tracing::debug;

/// Shared dispatcher cloned into every request task.
///
/// Holds the label table by shared read-only reference; nothing here is
/// mutated after construction.
#[derive(Clone)]
pub struct Dispatcher {
    labels: Arc<PartitionLabelTable>,
    producer: Arc<dyn Producer>,
    serializer: Arc<dyn Serializer>,
    default_topic: Arc<str>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    ///
    /// Unlabeled messages go to `default_topic` with unspecified
    /// partitioning.
    pub fn new(
        labels: PartitionLabelTable,
        producer: Arc<dyn Producer>,
        serializer: Arc<dyn Serializer>,
        default_topic: impl Into<String>,
    ) -> Self {
        Self {
            labels: Arc::new(labels),
            producer,
            serializer,
            default_topic: Arc::from(default_topic.into()),
        }
    }

    /// The label table requests are resolved against.
    pub fn labels(&self) -> &PartitionLabelTable {
        &self.labels
    }

    /// Topic used for unlabeled messages.
    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    /// Resolves where a message with `label` goes.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLabel` if the label is not in the table. Unknown
    /// labels are never routed to the default topic.
    pub fn route(&self, label: Option<&str>) -> Result<Route> {
        match label {
            Some(label) => self.labels.resolve(label).ok_or_else(|| FerryError::unknown_label(label)),
            None => Ok(Route { topic: self.default_topic.to_string(), partition: PartitionSelector::Unspecified }),
        }
    }

    /// Routes, serializes and enqueues one message.
    ///
    /// Returns the route the record was enqueued to. This does not mean the
    /// broker has accepted it.
    ///
    /// # Errors
    ///
    /// - `UnknownLabel` for labels missing from the table
    /// - `Serialization` when the serializer rejects the payload
    /// - `QueueFull`, `Produce` or `ProducerClosed` when the enqueue fails
    pub fn dispatch(&self, message: InboundMessage) -> Result<Route> {
        let result = self.try_dispatch(message);
        count_request(result.as_ref().err());
        result
    }

    /// Counts a request the transport rejected before it could be
    /// dispatched and hands the error back.
    pub fn reject(&self, error: FerryError) -> FerryError {
        count_request(Some(&error));
        error
    }

    fn try_dispatch(&self, message: InboundMessage) -> Result<Route> {
        let route = self.route(message.label.as_deref())?;
        let value = self.serializer.serialize(&message.payload)?;

        self.producer.produce(OutboundRecord::new(route.clone(), message.key, value))?;
        debug!(topic = %route.topic, partition = %route.partition, "message enqueued");

        Ok(route)
    }
}

fn count_request(error: Option<&FerryError>) {
    let outcome = match error {
        None => "accepted",
        Some(FerryError::UnknownLabel { .. }) => "routing_error",
        Some(FerryError::Serialization { .. }) => "serialization_error",
        Some(FerryError::QueueFull) => "queue_full",
        Some(_) => "enqueue_error",
    };
    metrics::counter!("ferry_requests_total", "outcome" => outcome).increment(1);
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("labels", &self.labels.len())
            .field("producer", &self.producer)
            .field("serializer", &self.serializer)
            .field("default_topic", &self.default_topic)
            .finish()
    }
}
