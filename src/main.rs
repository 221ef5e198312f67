//! Ferry HTTP to Kafka bridge.
//!
//! Main entry point. Validates configuration and broker metadata before
//! the listener binds, then serves until a shutdown signal, closing the
//! producer and the delivery monitor with bounded waits.

use std::sync::Arc;

use anyhow::{Context, Result};
use ferry_api::{cancel_on_signal, create_router, AppState, Config, Dispatcher};
use ferry_core::{PartitionLabelTable, Producer};
use ferry_producer::{DeliveryMonitor, KafkaProducer, TopicMetadataSync};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!("Starting Ferry bridge");
    info!(
        brokers = %config.kafka_broker_list,
        default_topic = %config.kafka_topic,
        compression = %config.kafka_compression,
        serialization = ?config.serialization_format,
        basic_auth = config.basic_auth,
        "Configuration loaded"
    );

    let producer_config = config.producer_config()?;
    let (producer, events) =
        KafkaProducer::configure(&producer_config).context("Failed to configure kafka producer")?;

    // Started before sync so broker errors during startup are reported.
    let monitor = DeliveryMonitor::new(events).spawn();

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let labels = sync_labels(&config, &producer, &shutdown).await?;

    let metrics = ferry_api::install_recorder().context("Failed to install metrics recorder")?;

    let producer = Arc::new(producer);
    let dispatcher = Dispatcher::new(
        labels,
        Arc::clone(&producer) as Arc<dyn Producer>,
        config.serialization_format.build(),
        config.kafka_topic.clone(),
    );
    let router = create_router(AppState::new(dispatcher).with_metrics(metrics), &config.server_options());

    let addr = config.parse_server_addr()?;
    info!(addr = %addr, "Ferry is ready to receive messages");

    // A server failure still goes through the bounded shutdown below.
    let served = ferry_api::start_server(router, addr, shutdown.clone()).await;
    shutdown.cancel();

    if let Err(e) = producer.close(config.shutdown_flush_timeout()).await {
        warn!(error = %e, "Producer did not flush cleanly");
    }

    match monitor.join(config.monitor_drain_timeout()).await {
        Ok(summary) => info!(
            delivered = summary.delivered,
            message_errors = summary.message_errors,
            broker_errors = summary.broker_errors,
            "Delivery monitor drained"
        ),
        Err(e) => warn!(error = %e, "Delivery monitor did not drain"),
    }

    served.context("HTTP server failed")?;
    info!("Ferry shutdown complete");
    Ok(())
}

/// Resolves configured partition labels, or returns an empty table when
/// none are configured.
async fn sync_labels(
    config: &Config,
    producer: &KafkaProducer,
    shutdown: &CancellationToken,
) -> Result<PartitionLabelTable> {
    let specs = config.label_specs()?;
    if specs.is_empty() {
        info!("No partition labels configured, skipping metadata sync");
        return Ok(PartitionLabelTable::empty());
    }

    TopicMetadataSync::new(producer, config.sync_options())
        .sync(shutdown, &specs)
        .await
        .context("Couldn't fetch topic metadata")
}

/// Initializes tracing with the configured filter directives.
fn init_tracing(directives: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(directives)
        .with_context(|| format!("Invalid rust_log filter `{directives}`"))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}
