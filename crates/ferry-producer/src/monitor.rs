//! Background consumer of delivery events.
//!
//! The monitor is the only reader of the producer's event sequence. It
//! logs every failure exactly once, counts outcomes and never retries:
//! delivery is at-most-once from the bridge's point of view, with any retry
//! left to the client transport. It runs until the sequence ends, which
//! happens when the producer is closed.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use ferry_core::{DeliveryEvent, DeliveryEvents, FerryError, Result};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome counters updated by the monitor.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    message_errors: AtomicU64,
    broker_errors: AtomicU64,
}

impl DeliveryStats {
    fn record(&self, event: &DeliveryEvent) {
        let counter = match event {
            DeliveryEvent::Success { .. } => &self.delivered,
            DeliveryEvent::MessageError { .. } => &self.message_errors,
            DeliveryEvent::BrokerError { .. } => &self.broker_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the counters.
    pub fn summary(&self) -> MonitorSummary {
        MonitorSummary {
            delivered: self.delivered.load(Ordering::Relaxed),
            message_errors: self.message_errors.load(Ordering::Relaxed),
            broker_errors: self.broker_errors.load(Ordering::Relaxed),
        }
    }
}

/// Totals observed by a monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorSummary {
    /// Records acknowledged by the broker.
    pub delivered: u64,
    /// Records that failed delivery.
    pub message_errors: u64,
    /// Connection-level errors.
    pub broker_errors: u64,
}

/// Drains delivery events and reports failures.
#[derive(Debug)]
pub struct DeliveryMonitor {
    events: DeliveryEvents,
    stats: Arc<DeliveryStats>,
}

impl DeliveryMonitor {
    /// Creates a monitor over the producer's event sequence.
    pub fn new(events: DeliveryEvents) -> Self {
        Self { events, stats: Arc::new(DeliveryStats::default()) }
    }

    /// Shared counters, readable while the monitor runs.
    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Classifies, logs and counts one event.
    pub fn handle_event(&self, event: &DeliveryEvent) {
        match event {
            DeliveryEvent::Success { topic, partition, offset } => {
                debug!(topic, partition, offset, "message delivered");
            },
            DeliveryEvent::MessageError { topic, partition, code, description } => {
                error!(
                    topic,
                    partition,
                    error_code = %code,
                    error = %description,
                    "failed to deliver message"
                );
            },
            DeliveryEvent::BrokerError { code, description } => {
                error!(error_code = %code, error = %description, "kafka broker error");
            },
        }

        self.stats.record(event);
        metrics::counter!("ferry_deliveries_total", "outcome" => event.outcome()).increment(1);
    }

    /// Processes events until the sequence ends.
    pub async fn run(mut self) -> MonitorSummary {
        info!("delivery monitor started");

        while let Some(event) = self.events.next().await {
            self.handle_event(&event);
        }

        let summary = self.stats.summary();
        info!(
            delivered = summary.delivered,
            message_errors = summary.message_errors,
            broker_errors = summary.broker_errors,
            "delivery monitor stopped"
        );
        summary
    }

    /// Runs the monitor on its own task.
    pub fn spawn(self) -> MonitorHandle {
        let stats = self.stats();
        let task = tokio::spawn(self.run());
        MonitorHandle { task, stats }
    }
}

/// Handle to a spawned [`DeliveryMonitor`].
#[derive(Debug)]
pub struct MonitorHandle {
    task: JoinHandle<MonitorSummary>,
    stats: Arc<DeliveryStats>,
}

impl MonitorHandle {
    /// Live counters of the running monitor.
    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Returns whether the monitor task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits at most `timeout` for the event sequence to end.
    ///
    /// # Errors
    ///
    /// Returns an error if the monitor is still running after `timeout`, in
    /// which case it is aborted, or if the task panicked.
    pub async fn join(mut self, timeout: Duration) -> Result<MonitorSummary> {
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(join)) => Err(FerryError::Other(join.into())),
            Err(_elapsed) => {
                self.task.abort();
                let summary = self.stats.summary();
                warn!(
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    delivered = summary.delivered,
                    "delivery monitor did not drain in time, aborted"
                );
                Err(FerryError::Other(anyhow::anyhow!(
                    "delivery monitor still running after {timeout:?}"
                )))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use ferry_core::delivery_channel;
    use ferry_testing::LogCapture;
    use tracing::Level;

    use super::*;

    fn message_error() -> DeliveryEvent {
        DeliveryEvent::MessageError {
            topic: "events".to_string(),
            partition: 3,
            code: "MessageSizeTooLarge".to_string(),
            description: "Broker: Message size too large".to_string(),
        }
    }

    #[test]
    fn message_error_logs_exactly_once_with_context() {
        let (_sender, events) = delivery_channel();
        let monitor = DeliveryMonitor::new(events);
        let capture = LogCapture::new();

        capture.in_scope(|| monitor.handle_event(&message_error()));

        let records = capture.at_least(Level::INFO);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, Level::ERROR);
        assert_eq!(record.field("topic"), Some("events"));
        assert_eq!(record.field("partition"), Some("3"));
        assert_eq!(record.field("error"), Some("Broker: Message size too large"));
        assert_eq!(monitor.stats().summary().message_errors, 1);
    }

    #[test]
    fn success_is_silent_at_default_verbosity() {
        let (_sender, events) = delivery_channel();
        let monitor = DeliveryMonitor::new(events);
        let capture = LogCapture::new();

        capture.in_scope(|| {
            monitor.handle_event(&DeliveryEvent::Success {
                topic: "events".to_string(),
                partition: 0,
                offset: 42,
            });
        });

        assert!(capture.at_least(Level::INFO).is_empty());
        assert_eq!(capture.at_least(Level::DEBUG).len(), 1);
    }

    #[test]
    fn broker_error_logs_code_and_description() {
        let (_sender, events) = delivery_channel();
        let monitor = DeliveryMonitor::new(events);
        let capture = LogCapture::new();

        capture.in_scope(|| {
            monitor.handle_event(&DeliveryEvent::BrokerError {
                code: "AllBrokersDown".to_string(),
                description: "1/1 brokers are down".to_string(),
            });
        });

        let records = capture.at_least(Level::INFO);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field("error_code"), Some("AllBrokersDown"));
        assert_eq!(monitor.stats().summary().broker_errors, 1);
    }

    #[tokio::test]
    async fn run_exits_when_sequence_closes() {
        let (sender, events) = delivery_channel();
        let handle = DeliveryMonitor::new(events).spawn();

        sender.send(message_error());
        sender.send(DeliveryEvent::Success { topic: "events".to_string(), partition: 3, offset: 1 });
        sender.close();

        let summary = handle.join(Duration::from_secs(1)).await.unwrap();
        assert_eq!(summary, MonitorSummary { delivered: 1, message_errors: 1, broker_errors: 0 });
    }

    #[tokio::test]
    async fn join_is_bounded_when_sequence_never_ends() {
        let (_sender, events) = delivery_channel();
        let handle = DeliveryMonitor::new(events).spawn();
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        let error = handle.join(Duration::from_millis(20)).await.unwrap_err();
        assert!(error.to_string().contains("still running"));
    }
}
