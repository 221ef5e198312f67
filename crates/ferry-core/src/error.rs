//! Error types and result handling for bridge operations.
//!
//! Defines the error taxonomy with stable codes for client disambiguation
//! and a coarse [`ErrorKind`] used to decide disposition: fatal at startup,
//! client error, or server error.

use thiserror::Error;

use crate::models::PartitionId;

/// Result type alias using `FerryError`.
pub type Result<T> = std::result::Result<T, FerryError>;

/// Disposition class of a [`FerryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inconsistent or unusable configuration.
    Config,
    /// Topic metadata could not be resolved or labels failed validation.
    Metadata,
    /// A request referenced a label that is not in the label table.
    Routing,
    /// The injected serializer rejected the payload.
    Serialization,
    /// The local send path refused the message.
    Enqueue,
    /// Anything else.
    Internal,
}

/// Ferry error types with codes.
#[derive(Debug, Error)]
pub enum FerryError {
    // Configuration Errors (E1001)
    /// Producer or service configuration is inconsistent (E1001).
    #[error("[E1001] Invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration
        message: String,
    },

    // Metadata Errors (E2001-E2005)
    /// Topic does not exist on the broker (E2001).
    #[error("[E2001] Topic not found: {topic}")]
    TopicNotFound {
        /// Topic that could not be found
        topic: String,
    },

    /// A label points at a partition the topic does not have (E2002).
    #[error(
        "[E2002] Partition out of range: label {label} references partition {partition} of \
         topic {topic} which has {partition_count} partitions"
    )]
    PartitionOutOfRange {
        /// Offending label
        label: String,
        /// Topic referenced by the label
        topic: String,
        /// Partition referenced by the label
        partition: PartitionId,
        /// Partition count reported by the broker
        partition_count: i32,
    },

    /// Metadata request did not complete in time (E2003).
    #[error("[E2003] Metadata timeout: topic {topic} not resolved after {attempts} attempts")]
    MetadataTimeout {
        /// Topic being resolved
        topic: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// Metadata sync was cancelled before it completed (E2004).
    #[error("[E2004] Metadata sync cancelled")]
    SyncCancelled,

    /// Broker returned an error while fetching metadata (E2005).
    #[error("[E2005] Metadata error for topic {topic}: {message}")]
    Metadata {
        /// Topic being resolved
        topic: String,
        /// Broker or client error description
        message: String,
    },

    // Request Errors (E3001-E3002)
    /// Request carried a label missing from the label table (E3001).
    #[error("[E3001] Unknown partition label: {label}")]
    UnknownLabel {
        /// The label that could not be resolved
        label: String,
    },

    /// Payload could not be serialized (E3002).
    #[error("[E3002] Serialization failed: {message}")]
    Serialization {
        /// Serializer error description
        message: String,
    },

    // Enqueue Errors (E4001-E4003)
    /// Local producer queue is saturated (E4001).
    #[error("[E4001] Queue full: producer send queue at capacity")]
    QueueFull,

    /// Producer refused the message synchronously (E4002).
    #[error("[E4002] Produce failed: {message}")]
    Produce {
        /// Client error description
        message: String,
    },

    /// Producer has been closed and no longer accepts messages (E4003).
    #[error("[E4003] Producer closed")]
    ProducerClosed,

    /// Generic error for wrapping other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FerryError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }

    /// Creates an unknown label error.
    pub fn unknown_label(label: impl Into<String>) -> Self {
        Self::UnknownLabel { label: label.into() }
    }

    /// Returns the error code (E1001-E4003).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "E1001",
            Self::TopicNotFound { .. } => "E2001",
            Self::PartitionOutOfRange { .. } => "E2002",
            Self::MetadataTimeout { .. } => "E2003",
            Self::SyncCancelled => "E2004",
            Self::Metadata { .. } => "E2005",
            Self::UnknownLabel { .. } => "E3001",
            Self::Serialization { .. } => "E3002",
            Self::QueueFull => "E4001",
            Self::Produce { .. } => "E4002",
            Self::ProducerClosed => "E4003",
            Self::Other(_) => "E9999",
        }
    }

    /// Returns the disposition class of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig { .. } => ErrorKind::Config,
            Self::TopicNotFound { .. }
            | Self::PartitionOutOfRange { .. }
            | Self::MetadataTimeout { .. }
            | Self::SyncCancelled
            | Self::Metadata { .. } => ErrorKind::Metadata,
            Self::UnknownLabel { .. } => ErrorKind::Routing,
            Self::Serialization { .. } => ErrorKind::Serialization,
            Self::QueueFull | Self::Produce { .. } | Self::ProducerClosed => ErrorKind::Enqueue,
            Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Returns whether this error must abort startup.
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Config | ErrorKind::Metadata)
    }

    /// Returns whether the caller sent something we cannot route or encode.
    pub const fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Routing | ErrorKind::Serialization)
    }
}
