//! Delivery events emitted by the broker client.
//!
//! Every produced record eventually yields one [`DeliveryEvent`], and the
//! client additionally reports connection-level failures. Events flow through
//! a single-consumer channel:
//!
//! ```text
//! ┌─────────────────┐  send()   ┌────────────────┐  next()  ┌─────────────────┐
//! │ Producer client │ ─────────▶│ unbounded mpsc │ ────────▶│ DeliveryMonitor │
//! │ (EventSender)   │           └────────────────┘          │ (DeliveryEvents)│
//! └─────────────────┘                                       └─────────────────┘
//!         │ close()                                                  ▲
//!         └──────────────── cancellation token ──────────────────────┘
//! ```
//!
//! [`DeliveryEvents`] is not `Clone`, so exactly one task can drain it. The
//! sequence ends when every [`EventSender`] is dropped, or once the producer
//! calls [`EventSender::close`] and the buffered events have been drained.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::PartitionId;

/// Outcome notification from the broker client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// The broker acknowledged the record.
    Success {
        /// Topic the record was written to.
        topic: String,
        /// Partition the record was written to.
        partition: PartitionId,
        /// Offset assigned by the broker.
        offset: i64,
    },

    /// The record could not be delivered.
    MessageError {
        /// Topic the record was destined for.
        topic: String,
        /// Partition the record was destined for, `-1` if never assigned.
        partition: PartitionId,
        /// Client error code name.
        code: String,
        /// Human-readable error description.
        description: String,
    },

    /// Connection-level failure not tied to a single record.
    BrokerError {
        /// Client error code name.
        code: String,
        /// Human-readable error description.
        description: String,
    },
}

impl DeliveryEvent {
    /// Short outcome name used for metrics labels.
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::MessageError { .. } => "message_error",
            Self::BrokerError { .. } => "broker_error",
        }
    }
}

impl fmt::Display for DeliveryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { topic, partition, offset } => {
                write!(f, "delivered to {topic}[{partition}]@{offset}")
            },
            Self::MessageError { topic, partition, code, description } => {
                write!(f, "failed to deliver to {topic}[{partition}]: {code}: {description}")
            },
            Self::BrokerError { code, description } => {
                write!(f, "broker error {code}: {description}")
            },
        }
    }
}

/// Producer side of the delivery event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::UnboundedSender<DeliveryEvent>,
    closed: CancellationToken,
}

impl EventSender {
    /// Publishes an event. Returns `false` if the consumer is gone.
    pub fn send(&self, event: DeliveryEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Marks the sequence as finished.
    ///
    /// Events already buffered are still handed out; once they are drained
    /// the consumer sees the end of the sequence even if senders remain.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Returns whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Consumer side of the delivery event channel.
#[derive(Debug)]
pub struct DeliveryEvents {
    receiver: mpsc::UnboundedReceiver<DeliveryEvent>,
    closed: CancellationToken,
}

impl DeliveryEvents {
    /// Waits for the next event, or `None` once the sequence has ended.
    pub async fn next(&mut self) -> Option<DeliveryEvent> {
        tokio::select! {
            biased;
            event = self.receiver.recv() => event,
            () = self.closed.cancelled() => self.receiver.try_recv().ok(),
        }
    }

    /// Returns an already buffered event without waiting.
    pub fn try_next(&mut self) -> Option<DeliveryEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Creates a connected sender and single consumer.
pub fn delivery_channel() -> (EventSender, DeliveryEvents) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let closed = CancellationToken::new();

    (EventSender { sender, closed: closed.clone() }, DeliveryEvents { receiver, closed })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(offset: i64) -> DeliveryEvent {
        DeliveryEvent::Success { topic: "events".to_string(), partition: 0, offset }
    }

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (sender, mut events) = delivery_channel();

        assert!(sender.send(success(1)));
        assert!(sender.send(success(2)));

        assert_eq!(events.next().await, Some(success(1)));
        assert_eq!(events.next().await, Some(success(2)));
    }

    #[tokio::test]
    async fn sequence_ends_when_senders_drop() {
        let (sender, mut events) = delivery_channel();
        sender.send(success(1));
        drop(sender);

        assert_eq!(events.next().await, Some(success(1)));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn close_drains_buffered_events_then_ends() {
        let (sender, mut events) = delivery_channel();
        let keep_alive = sender.clone();

        sender.send(success(1));
        sender.send(success(2));
        sender.close();

        assert!(keep_alive.is_closed());
        assert_eq!(events.next().await, Some(success(1)));
        assert_eq!(events.next().await, Some(success(2)));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn send_reports_dropped_consumer() {
        let (sender, events) = delivery_channel();
        drop(events);

        assert!(!sender.send(success(1)));
    }

    #[test]
    fn outcome_names_match_variants() {
        assert_eq!(success(0).outcome(), "success");
        assert_eq!(
            DeliveryEvent::BrokerError { code: "AllBrokersDown".into(), description: "x".into() }
                .outcome(),
            "broker_error"
        );
    }
}
