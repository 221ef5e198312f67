//! Error types for producer configuration.
//!
//! Every variant is fatal at startup: a producer built from inconsistent
//! security settings would either fail to connect or silently talk
//! plaintext to a broker that expects TLS.

use ferry_core::FerryError;
use thiserror::Error;

/// Configuration errors raised while building the producer.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// TLS material supplied with a protocol that does not use TLS.
    #[error("kafka security protocol `{protocol}` is not ssl based but ssl config is provided")]
    TlsProtocolMismatch {
        /// Configured protocol
        protocol: String,
    },

    /// SASL credentials supplied with a protocol that does not use SASL.
    #[error("kafka security protocol `{protocol}` is not sasl based but sasl config is provided")]
    SaslProtocolMismatch {
        /// Configured protocol, or `none`
        protocol: String,
    },

    /// Only some of the TLS settings were provided.
    #[error("incomplete ssl config: {missing} must be set together with the other ssl settings")]
    IncompleteTls {
        /// First missing setting
        missing: &'static str,
    },

    /// Only some of the SASL settings were provided.
    #[error("incomplete sasl config: {missing} must be set together with the other sasl settings")]
    IncompleteSasl {
        /// First missing setting
        missing: &'static str,
    },

    /// Protocol name not recognized.
    #[error("unknown kafka security protocol `{value}`")]
    UnknownProtocol {
        /// Rejected value
        value: String,
    },

    /// Compression codec not recognized.
    #[error("unknown kafka compression codec `{value}`")]
    UnknownCompression {
        /// Rejected value
        value: String,
    },

    /// Broker list is empty.
    #[error("kafka broker list is empty")]
    NoBrokers,

    /// Batch size of zero.
    #[error("kafka batch size must be greater than 0")]
    InvalidBatchSize,

    /// librdkafka refused the configuration.
    #[error("couldn't create kafka producer: {message}")]
    Client {
        /// Client error message
        message: String,
    },
}

impl From<ConfigError> for FerryError {
    fn from(error: ConfigError) -> Self {
        Self::config(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_convert_to_fatal_ferry_errors() {
        let error: FerryError = ConfigError::TlsProtocolMismatch { protocol: "plaintext".into() }.into();

        assert_eq!(error.code(), "E1001");
        assert!(error.is_fatal());
        assert!(error.to_string().contains("not ssl based"));
    }

    #[test]
    fn error_display_names_missing_setting() {
        let error = ConfigError::IncompleteSasl { missing: "sasl password" };
        assert_eq!(
            error.to_string(),
            "incomplete sasl config: sasl password must be set together with the other sasl settings"
        );
    }
}
