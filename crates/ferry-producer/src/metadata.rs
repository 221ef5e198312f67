//! Startup resolution of partition labels against broker metadata.
//!
//! Sync runs once before the HTTP listener binds. Each distinct topic
//! referenced by a label is queried for its partition count with a
//! per-attempt timeout and bounded retries. The label table is built only
//! after every topic resolved, so a failure anywhere leaves nothing
//! installed.

use std::{collections::HashMap, time::Duration};

use ferry_core::{FerryError, LabelSpec, PartitionLabelTable, Producer, Result, TopicMetadata};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{retry::RetryPolicy, DEFAULT_SYNC_TIMEOUT_MS};

/// Timeouts and retry policy for metadata sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Upper bound for a single metadata request.
    pub attempt_timeout: Duration,
    /// Retry policy applied per topic.
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(DEFAULT_SYNC_TIMEOUT_MS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Resolves label specs into a validated [`PartitionLabelTable`].
pub struct TopicMetadataSync<'a> {
    producer: &'a dyn Producer,
    options: SyncOptions,
}

impl<'a> TopicMetadataSync<'a> {
    /// Creates a sync over the given producer.
    pub fn new(producer: &'a dyn Producer, options: SyncOptions) -> Self {
        Self { producer, options }
    }

    /// Queries every referenced topic and validates all labels.
    ///
    /// # Errors
    ///
    /// - `SyncCancelled` when `cancel` fires before sync finishes
    /// - `TopicNotFound` or `Metadata` when retries are exhausted on a broker
    ///   error
    /// - `MetadataTimeout` when retries are exhausted on timeouts
    /// - `PartitionOutOfRange` when a label points past the partition count
    #[instrument(name = "metadata_sync", skip_all, fields(labels = specs.len()))]
    pub async fn sync(&self, cancel: &CancellationToken, specs: &[LabelSpec]) -> Result<PartitionLabelTable> {
        let mut metadata = HashMap::new();

        for topic in LabelSpec::topics(specs) {
            let partition_count = self.resolve_topic(cancel, topic).await?;
            info!(topic, partition_count, "topic metadata resolved");
            metadata.insert(topic.to_string(), TopicMetadata { topic: topic.to_string(), partition_count });
        }

        let table = PartitionLabelTable::build(specs, &metadata)?;
        for (label, topic, partition) in table.iter() {
            debug!(label, topic, partition, "partition label installed");
        }
        info!(labels = table.len(), topics = metadata.len(), "partition label table ready");

        Ok(table)
    }

    async fn resolve_topic(&self, cancel: &CancellationToken, topic: &str) -> Result<i32> {
        let policy = &self.options.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(FerryError::SyncCancelled),
                outcome = tokio::time::timeout(
                    self.options.attempt_timeout,
                    self.producer.partition_count(topic, self.options.attempt_timeout),
                ) => outcome,
            };

            let error = match outcome {
                Ok(Ok(count)) => return Ok(count),
                Ok(Err(error)) => error,
                Err(_elapsed) => FerryError::MetadataTimeout { topic: topic.to_string(), attempts: attempt },
            };

            if !policy.should_retry(attempt) {
                return Err(match error {
                    FerryError::MetadataTimeout { .. } => {
                        FerryError::MetadataTimeout { topic: topic.to_string(), attempts: attempt }
                    },
                    other => other,
                });
            }

            let delay = policy.delay_for(attempt);
            warn!(
                topic,
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "metadata fetch failed, retrying"
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(FerryError::SyncCancelled),
                () = tokio::time::sleep(delay) => {},
            }
        }
    }
}
