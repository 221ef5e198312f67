//! Kafka producer client with label-based partition routing.
//!
//! This crate owns everything that talks to the broker:
//!
//! 1. **Configure** - [`ProducerConfig`] validates security settings and
//!    [`KafkaProducer::configure`] builds the librdkafka client
//! 2. **Sync** - [`TopicMetadataSync`] resolves partition labels against
//!    broker partition counts before any traffic is served
//! 3. **Produce** - records are enqueued without waiting for acknowledgment
//! 4. **Monitor** - [`DeliveryMonitor`] drains delivery events and logs
//!    failures for the lifetime of the process
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use ferry_core::LabelSpec;
//! use ferry_producer::{
//!     DeliveryMonitor, KafkaProducer, ProducerConfig, ProducerSettings, SyncOptions,
//!     TopicMetadataSync,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> ferry_core::Result<()> {
//! let config = ProducerConfig::try_from(ProducerSettings::default())?;
//! let (producer, events) = KafkaProducer::configure(&config)?;
//! let monitor = DeliveryMonitor::new(events).spawn();
//!
//! let specs = LabelSpec::parse_list("orders=events:3")?;
//! let table = TopicMetadataSync::new(&producer, SyncOptions::default())
//!     .sync(&CancellationToken::new(), &specs)
//!     .await?;
//! assert_eq!(table.len(), 1);
//!
//! # use ferry_core::Producer;
//! producer.close(Duration::from_secs(10)).await?;
//! monitor.join(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod metadata;
pub mod monitor;
pub mod retry;

pub use client::KafkaProducer;
pub use config::{Compression, ProducerConfig, ProducerSettings, SaslConfig, SecurityProtocol, TlsConfig};
pub use error::ConfigError;
pub use metadata::{SyncOptions, TopicMetadataSync};
pub use monitor::{DeliveryMonitor, DeliveryStats, MonitorHandle, MonitorSummary};
pub use retry::{BackoffStrategy, RetryPolicy};

/// Default `batch.num.messages` for the producer.
pub const DEFAULT_BATCH_NUM_MESSAGES: u32 = 10_000;

/// Default number of metadata fetch attempts per topic.
pub const DEFAULT_SYNC_ATTEMPTS: u32 = 5;

/// Default timeout of a single metadata fetch in milliseconds.
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 10_000;
