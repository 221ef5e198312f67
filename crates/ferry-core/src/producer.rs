//! Producer seam between request dispatch and the broker client.
//!
//! The HTTP layer and metadata sync only see this trait, so tests can swap
//! in an in-memory broker while production uses the librdkafka client.

use std::{fmt, time::Duration};

use async_trait::async_trait;

use crate::{error::Result, models::OutboundRecord};

/// Asynchronous, fire-and-forget message producer.
///
/// Implementations must be safe for concurrent use from many request tasks
/// without external locking. Delivery outcomes are reported out of band via
/// the [`DeliveryEvents`](crate::DeliveryEvents) handed out when the
/// producer is created.
#[async_trait]
pub trait Producer: Send + Sync + fmt::Debug {
    /// Enqueues a record for asynchronous delivery.
    ///
    /// Returns as soon as the record sits in the local send queue. Success
    /// says nothing about whether the broker will accept it.
    ///
    /// # Errors
    ///
    /// - `QueueFull` when the local queue is saturated
    /// - `Produce` for any other synchronous client refusal
    /// - `ProducerClosed` after [`close`](Self::close)
    fn produce(&self, record: OutboundRecord) -> Result<()>;

    /// Asks the broker how many partitions `topic` has.
    ///
    /// # Errors
    ///
    /// - `TopicNotFound` if the broker does not know the topic
    /// - `MetadataTimeout` if no answer arrives within `timeout`
    /// - `Metadata` for any other broker error
    async fn partition_count(&self, topic: &str, timeout: Duration) -> Result<i32>;

    /// Flushes queued records for at most `timeout` and ends the delivery
    /// event sequence.
    ///
    /// # Errors
    ///
    /// Returns `Produce` if records were still queued when the timeout hit.
    /// The event sequence is ended regardless.
    async fn close(&self, timeout: Duration) -> Result<()>;
}
