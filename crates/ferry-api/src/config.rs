//! Configuration management for the Ferry bridge.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use ferry_core::{LabelSpec, SerializationFormat};
use ferry_producer::{
    BackoffStrategy, ProducerConfig, ProducerSettings, RetryPolicy, SyncOptions,
    DEFAULT_BATCH_NUM_MESSAGES, DEFAULT_SYNC_ATTEMPTS, DEFAULT_SYNC_TIMEOUT_MS,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{middleware::auth::BasicAuth, server::ServerOptions};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// # Example
///
/// ```no_run
/// use ferry_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Forwarding to {} via {}", config.kafka_topic, config.kafka_broker_list);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,
    /// Largest accepted request body in bytes.
    ///
    /// Environment variable: `MAX_PAYLOAD_BYTES`
    #[serde(default = "default_max_payload_bytes", alias = "MAX_PAYLOAD_BYTES")]
    pub max_payload_bytes: usize,

    // Broker
    /// Comma separated broker addresses.
    ///
    /// Environment variable: `KAFKA_BROKER_LIST`
    #[serde(default = "default_broker_list", alias = "KAFKA_BROKER_LIST")]
    pub kafka_broker_list: String,
    /// Topic for messages without a partition label.
    ///
    /// Environment variable: `KAFKA_TOPIC`
    #[serde(default = "default_topic", alias = "KAFKA_TOPIC")]
    pub kafka_topic: String,
    /// Compression codec (none, gzip, snappy, lz4, zstd).
    ///
    /// Environment variable: `KAFKA_COMPRESSION`
    #[serde(default = "default_compression", alias = "KAFKA_COMPRESSION")]
    pub kafka_compression: String,
    /// Messages per producer batch.
    ///
    /// Environment variable: `KAFKA_BATCH_NUM_MESSAGES`
    #[serde(default = "default_batch_num_messages", alias = "KAFKA_BATCH_NUM_MESSAGES")]
    pub kafka_batch_num_messages: u32,
    /// Security protocol; empty resolves from the TLS settings.
    ///
    /// Environment variable: `KAFKA_SECURITY_PROTOCOL`
    #[serde(default, alias = "KAFKA_SECURITY_PROTOCOL")]
    pub kafka_security_protocol: String,

    // TLS
    /// Client certificate path.
    ///
    /// Environment variable: `KAFKA_SSL_CLIENT_CERT_FILE`
    #[serde(default, alias = "KAFKA_SSL_CLIENT_CERT_FILE")]
    pub kafka_ssl_client_cert_file: Option<String>,
    /// Client key path.
    ///
    /// Environment variable: `KAFKA_SSL_CLIENT_KEY_FILE`
    #[serde(default, alias = "KAFKA_SSL_CLIENT_KEY_FILE")]
    pub kafka_ssl_client_key_file: Option<String>,
    /// Client key passphrase.
    ///
    /// Environment variable: `KAFKA_SSL_CLIENT_KEY_PASS`
    #[serde(default, alias = "KAFKA_SSL_CLIENT_KEY_PASS")]
    pub kafka_ssl_client_key_pass: Option<String>,
    /// CA certificate path.
    ///
    /// Environment variable: `KAFKA_SSL_CA_CERT_FILE`
    #[serde(default, alias = "KAFKA_SSL_CA_CERT_FILE")]
    pub kafka_ssl_ca_cert_file: Option<String>,

    // SASL
    /// SASL mechanism.
    ///
    /// Environment variable: `KAFKA_SASL_MECHANISM`
    #[serde(default, alias = "KAFKA_SASL_MECHANISM")]
    pub kafka_sasl_mechanism: Option<String>,
    /// SASL username.
    ///
    /// Environment variable: `KAFKA_SASL_USERNAME`
    #[serde(default, alias = "KAFKA_SASL_USERNAME")]
    pub kafka_sasl_username: Option<String>,
    /// SASL password.
    ///
    /// Environment variable: `KAFKA_SASL_PASSWORD`
    #[serde(default, alias = "KAFKA_SASL_PASSWORD")]
    pub kafka_sasl_password: Option<String>,

    // Labels
    /// Partition labels as `label=topic:partition,...`.
    ///
    /// Environment variable: `KAFKA_PARTITION_LABELS`
    #[serde(default, alias = "KAFKA_PARTITION_LABELS")]
    pub kafka_partition_labels: String,

    // Metadata sync
    /// Metadata fetch attempts per topic.
    ///
    /// Environment variable: `METADATA_SYNC_ATTEMPTS`
    #[serde(default = "default_sync_attempts", alias = "METADATA_SYNC_ATTEMPTS")]
    pub metadata_sync_attempts: u32,
    /// Timeout of one metadata fetch in milliseconds.
    ///
    /// Environment variable: `METADATA_SYNC_TIMEOUT_MS`
    #[serde(default = "default_sync_timeout_ms", alias = "METADATA_SYNC_TIMEOUT_MS")]
    pub metadata_sync_timeout_ms: u64,
    /// Base delay between metadata retries in milliseconds.
    ///
    /// Environment variable: `METADATA_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_retry_base_delay_ms", alias = "METADATA_RETRY_BASE_DELAY_MS")]
    pub metadata_retry_base_delay_ms: u64,
    /// Maximum delay between metadata retries in milliseconds.
    ///
    /// Environment variable: `METADATA_RETRY_MAX_DELAY_MS`
    #[serde(default = "default_retry_max_delay_ms", alias = "METADATA_RETRY_MAX_DELAY_MS")]
    pub metadata_retry_max_delay_ms: u64,

    // Shutdown
    /// Upper bound for flushing queued records on shutdown, in seconds.
    ///
    /// Environment variable: `SHUTDOWN_FLUSH_TIMEOUT_SECONDS`
    #[serde(default = "default_flush_timeout", alias = "SHUTDOWN_FLUSH_TIMEOUT_SECONDS")]
    pub shutdown_flush_timeout_seconds: u64,
    /// Upper bound for the delivery monitor to drain, in seconds.
    ///
    /// Environment variable: `MONITOR_DRAIN_TIMEOUT_SECONDS`
    #[serde(default = "default_drain_timeout", alias = "MONITOR_DRAIN_TIMEOUT_SECONDS")]
    pub monitor_drain_timeout_seconds: u64,

    // Payload
    /// Serializer applied to request bodies.
    ///
    /// Environment variable: `SERIALIZATION_FORMAT`
    #[serde(default, alias = "SERIALIZATION_FORMAT")]
    pub serialization_format: SerializationFormat,

    // Inbound auth
    /// Requires HTTP basic auth on the receive endpoint.
    ///
    /// Environment variable: `BASIC_AUTH`
    #[serde(default, alias = "BASIC_AUTH")]
    pub basic_auth: bool,
    /// Basic auth username.
    ///
    /// Environment variable: `BASIC_AUTH_USERNAME`
    #[serde(default, alias = "BASIC_AUTH_USERNAME")]
    pub basic_auth_username: Option<String>,
    /// Basic auth password.
    ///
    /// Environment variable: `BASIC_AUTH_PASSWORD`
    #[serde(default, alias = "BASIC_AUTH_PASSWORD")]
    pub basic_auth_password: Option<String>,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be parsed or the merged values are
    /// inconsistent.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Raw producer settings for [`ProducerConfig`].
    pub fn producer_settings(&self) -> ProducerSettings {
        ProducerSettings {
            brokers: vec![self.kafka_broker_list.clone()],
            compression: self.kafka_compression.clone(),
            batch_num_messages: self.kafka_batch_num_messages,
            security_protocol: Some(self.kafka_security_protocol.clone()),
            ssl_ca_cert_file: self.kafka_ssl_ca_cert_file.clone(),
            ssl_client_cert_file: self.kafka_ssl_client_cert_file.clone(),
            ssl_client_key_file: self.kafka_ssl_client_key_file.clone(),
            ssl_client_key_pass: self.kafka_ssl_client_key_pass.clone(),
            sasl_mechanism: self.kafka_sasl_mechanism.clone(),
            sasl_username: self.kafka_sasl_username.clone(),
            sasl_password: self.kafka_sasl_password.clone(),
            client_id: "ferry".to_string(),
        }
    }

    /// Validated producer configuration.
    ///
    /// # Errors
    ///
    /// Fails on inconsistent TLS, SASL or protocol settings.
    pub fn producer_config(&self) -> Result<ProducerConfig> {
        ProducerConfig::try_from(self.producer_settings()).context("Invalid kafka producer configuration")
    }

    /// Partition label specs, empty when none are configured.
    ///
    /// # Errors
    ///
    /// Fails on malformed or duplicate labels.
    pub fn label_specs(&self) -> Result<Vec<LabelSpec>> {
        LabelSpec::parse_list(&self.kafka_partition_labels).context("Invalid kafka partition labels")
    }

    /// Metadata sync timeouts and retry policy.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            attempt_timeout: Duration::from_millis(self.metadata_sync_timeout_ms),
            retry: RetryPolicy {
                max_attempts: self.metadata_sync_attempts,
                base_delay: Duration::from_millis(self.metadata_retry_base_delay_ms),
                max_delay: Duration::from_millis(self.metadata_retry_max_delay_ms),
                jitter_factor: 0.25,
                backoff_strategy: BackoffStrategy::Exponential,
            },
        }
    }

    /// HTTP server options.
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            request_timeout: Duration::from_secs(self.request_timeout),
            max_payload_bytes: self.max_payload_bytes,
            basic_auth: self.basic_auth_credentials(),
        }
    }

    /// Credentials for the receive endpoint when basic auth is enabled.
    pub fn basic_auth_credentials(&self) -> Option<BasicAuth> {
        if !self.basic_auth {
            return None;
        }
        match (&self.basic_auth_username, &self.basic_auth_password) {
            (Some(username), Some(password)) => Some(BasicAuth::new(username, password)),
            _ => None,
        }
    }

    /// Bound on flushing the producer during shutdown.
    pub const fn shutdown_flush_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_flush_timeout_seconds)
    }

    /// Bound on waiting for the delivery monitor during shutdown.
    pub const fn monitor_drain_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor_drain_timeout_seconds)
    }

    /// Parse server socket address from host and port configuration.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.max_payload_bytes == 0 {
            anyhow::bail!("max_payload_bytes must be greater than 0");
        }

        if self.kafka_topic.trim().is_empty() {
            anyhow::bail!("kafka_topic must not be empty");
        }

        if self.metadata_sync_attempts == 0 {
            anyhow::bail!("metadata_sync_attempts must be greater than 0");
        }

        if self.metadata_sync_timeout_ms == 0 {
            anyhow::bail!("metadata_sync_timeout_ms must be greater than 0");
        }

        if self.metadata_retry_base_delay_ms > self.metadata_retry_max_delay_ms {
            anyhow::bail!("metadata_retry_base_delay_ms cannot exceed metadata_retry_max_delay_ms");
        }

        if self.basic_auth && (self.basic_auth_username.is_none() || self.basic_auth_password.is_none()) {
            anyhow::bail!("basic_auth requires basic_auth_username and basic_auth_password");
        }

        self.producer_config()?;
        self.label_specs()?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_payload_bytes: default_max_payload_bytes(),
            kafka_broker_list: default_broker_list(),
            kafka_topic: default_topic(),
            kafka_compression: default_compression(),
            kafka_batch_num_messages: default_batch_num_messages(),
            kafka_security_protocol: String::new(),
            kafka_ssl_client_cert_file: None,
            kafka_ssl_client_key_file: None,
            kafka_ssl_client_key_pass: None,
            kafka_ssl_ca_cert_file: None,
            kafka_sasl_mechanism: None,
            kafka_sasl_username: None,
            kafka_sasl_password: None,
            kafka_partition_labels: String::new(),
            metadata_sync_attempts: default_sync_attempts(),
            metadata_sync_timeout_ms: default_sync_timeout_ms(),
            metadata_retry_base_delay_ms: default_retry_base_delay_ms(),
            metadata_retry_max_delay_ms: default_retry_max_delay_ms(),
            shutdown_flush_timeout_seconds: default_flush_timeout(),
            monitor_drain_timeout_seconds: default_drain_timeout(),
            serialization_format: SerializationFormat::default(),
            basic_auth: false,
            basic_auth_username: None,
            basic_auth_password: None,
            rust_log: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_payload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_broker_list() -> String {
    "kafka:9092".to_string()
}

fn default_topic() -> String {
    "metrics".to_string()
}

fn default_compression() -> String {
    "none".to_string()
}

fn default_batch_num_messages() -> u32 {
    DEFAULT_BATCH_NUM_MESSAGES
}

fn default_sync_attempts() -> u32 {
    DEFAULT_SYNC_ATTEMPTS
}

fn default_sync_timeout_ms() -> u64 {
    DEFAULT_SYNC_TIMEOUT_MS
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    5000
}

fn default_flush_timeout() -> u64 {
    10
}

fn default_drain_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, sync::Mutex};

    use ferry_producer::SecurityProtocol;

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        vars: Vec<String>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, vars: Vec::new(), originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            if !self.vars.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.vars.push(key.to_string());
            }
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for var in &self.vars {
                match self.originals.get(var) {
                    Some(Some(value)) => env::set_var(var, value),
                    Some(None) => env::remove_var(var),
                    None => {},
                }
            }
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.kafka_topic, "metrics");
        assert_eq!(config.kafka_broker_list, "kafka:9092");
        assert!(config.label_specs().unwrap().is_empty());
        assert!(config.server_options().basic_auth.is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("PORT", "9090");
        guard.set_var("KAFKA_BROKER_LIST", "b1:9092,b2:9092");
        guard.set_var("KAFKA_TOPIC", "events");
        guard.set_var("KAFKA_PARTITION_LABELS", "orders=events:3,refunds=events:1");
        guard.set_var("METADATA_SYNC_ATTEMPTS", "7");
        guard.set_var("SERIALIZATION_FORMAT", "raw");

        let config = Config::load().expect("Config should load with env overrides");

        assert_eq!(config.port, 9090);
        assert_eq!(config.kafka_topic, "events");
        assert_eq!(config.serialization_format, SerializationFormat::Raw);
        assert_eq!(config.label_specs().unwrap().len(), 2);
        assert_eq!(config.sync_options().retry.max_attempts, 7);
        assert_eq!(config.producer_config().unwrap().brokers(), ["b1:9092", "b2:9092"]);
    }

    #[test]
    fn tls_settings_resolve_protocol() {
        let config = Config {
            kafka_ssl_client_cert_file: Some("/certs/client.pem".to_string()),
            kafka_ssl_client_key_file: Some("/certs/client.key".to_string()),
            kafka_ssl_ca_cert_file: Some("/certs/ca.pem".to_string()),
            ..Config::default()
        };

        let producer = config.producer_config().unwrap();
        assert_eq!(producer.security_protocol(), Some(SecurityProtocol::Ssl));
    }

    #[test]
    fn inconsistent_settings_fail_validation() {
        let tls_over_plaintext = Config {
            kafka_security_protocol: "plaintext".to_string(),
            kafka_ssl_client_cert_file: Some("/certs/client.pem".to_string()),
            kafka_ssl_client_key_file: Some("/certs/client.key".to_string()),
            kafka_ssl_ca_cert_file: Some("/certs/ca.pem".to_string()),
            ..Config::default()
        };
        assert!(tls_over_plaintext.validate().is_err());

        let duplicate_labels =
            Config { kafka_partition_labels: "a=events:1,a=events:2".to_string(), ..Config::default() };
        assert!(duplicate_labels.validate().is_err());

        let auth_without_password = Config {
            basic_auth: true,
            basic_auth_username: Some("bridge".to_string()),
            ..Config::default()
        };
        assert!(auth_without_password.validate().is_err());

        let mut config = Config::default();
        config.port = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.metadata_retry_base_delay_ms = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn conversions_carry_timeouts() {
        let config = Config {
            metadata_sync_timeout_ms: 2500,
            shutdown_flush_timeout_seconds: 3,
            monitor_drain_timeout_seconds: 2,
            request_timeout: 15,
            ..Config::default()
        };

        assert_eq!(config.sync_options().attempt_timeout, Duration::from_millis(2500));
        assert_eq!(config.shutdown_flush_timeout(), Duration::from_secs(3));
        assert_eq!(config.monitor_drain_timeout(), Duration::from_secs(2));
        assert_eq!(config.server_options().request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn socket_address_parsing() {
        let config = Config { host: "127.0.0.1".to_string(), port: 9000, ..Config::default() };

        let addr = config.parse_server_addr().expect("Should parse socket address");

        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn log_filter_follows_rust_log() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("RUST_LOG", "warn,ferry_producer=debug");
        let config = Config::load().expect("Config should load with RUST_LOG");

        assert_eq!(config.rust_log, "warn,ferry_producer=debug");
    }
}
