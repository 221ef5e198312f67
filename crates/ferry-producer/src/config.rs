//! Producer configuration with security validation.
//!
//! [`ProducerSettings`] carries raw values as they come from configuration
//! files and environment variables. Converting them into a
//! [`ProducerConfig`] resolves the security protocol and rejects
//! combinations that cannot work:
//!
//! - TLS material present and no protocol set resolves to `ssl`
//! - TLS material requires `ssl` or `sasl_ssl`
//! - SASL credentials require `sasl_ssl` or `sasl_plaintext`
//!
//! A `ProducerConfig` cannot be modified after construction.

use std::{fmt, path::PathBuf, str::FromStr};

use rdkafka::config::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, DEFAULT_BATCH_NUM_MESSAGES};

/// Broker security protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityProtocol {
    /// No encryption, no authentication.
    Plaintext,
    /// TLS encryption.
    Ssl,
    /// SASL authentication over plaintext.
    SaslPlaintext,
    /// SASL authentication over TLS.
    SaslSsl,
}

impl SecurityProtocol {
    /// librdkafka `security.protocol` value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plaintext => "plaintext",
            Self::Ssl => "ssl",
            Self::SaslPlaintext => "sasl_plaintext",
            Self::SaslSsl => "sasl_ssl",
        }
    }

    /// Returns whether the protocol carries TLS material.
    pub const fn uses_tls(self) -> bool {
        matches!(self, Self::Ssl | Self::SaslSsl)
    }

    /// Returns whether the protocol carries SASL credentials.
    pub const fn uses_sasl(self) -> bool {
        matches!(self, Self::SaslPlaintext | Self::SaslSsl)
    }
}

impl FromStr for SecurityProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plaintext" => Ok(Self::Plaintext),
            "ssl" => Ok(Self::Ssl),
            "sasl_plaintext" => Ok(Self::SaslPlaintext),
            "sasl_ssl" => Ok(Self::SaslSsl),
            _ => Err(ConfigError::UnknownProtocol { value: s.to_string() }),
        }
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression codec applied to message batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// Gzip compression.
    Gzip,
    /// Snappy compression.
    Snappy,
    /// LZ4 compression.
    Lz4,
    /// Zstandard compression.
    Zstd,
}

impl Compression {
    /// librdkafka `compression.codec` value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Snappy => "snappy",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }
}

impl FromStr for Compression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            "snappy" => Ok(Self::Snappy),
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            _ => Err(ConfigError::UnknownCompression { value: s.to_string() }),
        }
    }
}

/// TLS material for the broker connection.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// CA certificate used to verify the broker.
    pub ca_location: PathBuf,
    /// Client certificate.
    pub certificate_location: PathBuf,
    /// Client private key.
    pub key_location: PathBuf,
    /// Passphrase of the private key, if encrypted.
    pub key_password: Option<String>,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_location", &self.ca_location)
            .field("certificate_location", &self.certificate_location)
            .field("key_location", &self.key_location)
            .field("key_password", &self.key_password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// SASL credentials for the broker connection.
#[derive(Clone, PartialEq, Eq)]
pub struct SaslConfig {
    /// SASL mechanism, e.g. `PLAIN` or `SCRAM-SHA-512`.
    pub mechanism: String,
    /// SASL username.
    pub username: String,
    /// SASL password.
    pub password: String,
}

impl fmt::Debug for SaslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslConfig")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Raw producer settings before validation.
///
/// Empty strings are treated the same as unset values, since environment
/// variables are commonly exported empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerSettings {
    /// Broker addresses.
    pub brokers: Vec<String>,
    /// Compression codec name.
    pub compression: String,
    /// Messages per batch.
    pub batch_num_messages: u32,
    /// Security protocol name.
    pub security_protocol: Option<String>,
    /// CA certificate path.
    pub ssl_ca_cert_file: Option<String>,
    /// Client certificate path.
    pub ssl_client_cert_file: Option<String>,
    /// Client key path.
    pub ssl_client_key_file: Option<String>,
    /// Client key passphrase.
    pub ssl_client_key_pass: Option<String>,
    /// SASL mechanism.
    pub sasl_mechanism: Option<String>,
    /// SASL username.
    pub sasl_username: Option<String>,
    /// SASL password.
    pub sasl_password: Option<String>,
    /// Client identifier reported to the broker.
    pub client_id: String,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            brokers: vec!["kafka:9092".to_string()],
            compression: "none".to_string(),
            batch_num_messages: DEFAULT_BATCH_NUM_MESSAGES,
            security_protocol: None,
            ssl_ca_cert_file: None,
            ssl_client_cert_file: None,
            ssl_client_key_file: None,
            ssl_client_key_pass: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            client_id: "ferry".to_string(),
        }
    }
}

/// Validated, immutable producer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    brokers: Vec<String>,
    compression: Compression,
    batch_num_messages: u32,
    security_protocol: Option<SecurityProtocol>,
    tls: Option<TlsConfig>,
    sasl: Option<SaslConfig>,
    client_id: String,
}

impl ProducerConfig {
    /// Broker addresses.
    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    /// Compression codec.
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// Messages per batch.
    pub const fn batch_num_messages(&self) -> u32 {
        self.batch_num_messages
    }

    /// Resolved security protocol; `None` leaves the client default.
    pub const fn security_protocol(&self) -> Option<SecurityProtocol> {
        self.security_protocol
    }

    /// TLS material, if configured.
    pub const fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    /// SASL credentials, if configured.
    pub const fn sasl(&self) -> Option<&SaslConfig> {
        self.sasl.as_ref()
    }

    /// Translates into librdkafka settings.
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", self.brokers.join(","))
            .set("client.id", &self.client_id)
            .set("compression.codec", self.compression.as_str())
            .set("batch.num.messages", self.batch_num_messages.to_string());

        if let Some(protocol) = self.security_protocol {
            client.set("security.protocol", protocol.as_str());
        }

        if let Some(tls) = &self.tls {
            client
                .set("ssl.ca.location", tls.ca_location.to_string_lossy())
                .set("ssl.certificate.location", tls.certificate_location.to_string_lossy())
                .set("ssl.key.location", tls.key_location.to_string_lossy());
            if let Some(password) = &tls.key_password {
                client.set("ssl.key.password", password);
            }
        }

        if let Some(sasl) = &self.sasl {
            client
                .set("sasl.mechanism", &sasl.mechanism)
                .set("sasl.username", &sasl.username)
                .set("sasl.password", &sasl.password);
        }

        client
    }
}

impl TryFrom<ProducerSettings> for ProducerConfig {
    type Error = ConfigError;

    fn try_from(settings: ProducerSettings) -> Result<Self, Self::Error> {
        let brokers: Vec<String> = settings
            .brokers
            .iter()
            .flat_map(|entry| entry.split(','))
            .map(str::trim)
            .filter(|broker| !broker.is_empty())
            .map(String::from)
            .collect();
        if brokers.is_empty() {
            return Err(ConfigError::NoBrokers);
        }

        if settings.batch_num_messages == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        let compression: Compression = settings.compression.parse()?;

        let mut security_protocol =
            present(&settings.security_protocol).map(str::parse::<SecurityProtocol>).transpose()?;

        let tls = tls_from(&settings)?;
        if tls.is_some() {
            let protocol = security_protocol.unwrap_or(SecurityProtocol::Ssl);
            if !protocol.uses_tls() {
                return Err(ConfigError::TlsProtocolMismatch { protocol: protocol.to_string() });
            }
            security_protocol = Some(protocol);
        }

        let sasl = sasl_from(&settings)?;
        if sasl.is_some() {
            match security_protocol {
                Some(protocol) if protocol.uses_sasl() => {},
                other => {
                    return Err(ConfigError::SaslProtocolMismatch {
                        protocol: other.map_or_else(|| "none".to_string(), |p| p.to_string()),
                    });
                },
            }
        }

        Ok(Self {
            brokers,
            compression,
            batch_num_messages: settings.batch_num_messages,
            security_protocol,
            tls,
            sasl,
            client_id: settings.client_id,
        })
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn tls_from(settings: &ProducerSettings) -> Result<Option<TlsConfig>, ConfigError> {
    let cert = present(&settings.ssl_client_cert_file);
    let key = present(&settings.ssl_client_key_file);
    let ca = present(&settings.ssl_ca_cert_file);
    let key_password = present(&settings.ssl_client_key_pass);

    match (cert, key, ca) {
        (None, None, None) if key_password.is_none() => Ok(None),
        (Some(cert), Some(key), Some(ca)) => Ok(Some(TlsConfig {
            ca_location: PathBuf::from(ca),
            certificate_location: PathBuf::from(cert),
            key_location: PathBuf::from(key),
            key_password: key_password.map(String::from),
        })),
        (None, ..) => Err(ConfigError::IncompleteTls { missing: "ssl client cert file" }),
        (_, None, _) => Err(ConfigError::IncompleteTls { missing: "ssl client key file" }),
        (.., None) => Err(ConfigError::IncompleteTls { missing: "ssl ca cert file" }),
    }
}

fn sasl_from(settings: &ProducerSettings) -> Result<Option<SaslConfig>, ConfigError> {
    let mechanism = present(&settings.sasl_mechanism);
    let username = present(&settings.sasl_username);
    let password = present(&settings.sasl_password);

    match (mechanism, username, password) {
        (None, None, None) => Ok(None),
        (Some(mechanism), Some(username), Some(password)) => Ok(Some(SaslConfig {
            mechanism: mechanism.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })),
        (None, ..) => Err(ConfigError::IncompleteSasl { missing: "sasl mechanism" }),
        (_, None, _) => Err(ConfigError::IncompleteSasl { missing: "sasl username" }),
        (.., None) => Err(ConfigError::IncompleteSasl { missing: "sasl password" }),
    }
}
