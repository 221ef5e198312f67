//! Payload serializers injected into request dispatch.

use std::{fmt, str::FromStr, sync::Arc};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{FerryError, Result};

/// Turns a raw request body into the bytes written to the broker.
pub trait Serializer: Send + Sync + fmt::Debug {
    /// Serializes one payload.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` when the payload cannot be encoded.
    fn serialize(&self, raw: &Bytes) -> Result<Bytes>;
}

/// Validates JSON payloads and re-encodes them compactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, raw: &Bytes) -> Result<Bytes> {
        let value: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|e| FerryError::serialization(format!("payload is not valid JSON: {e}")))?;

        serde_json::to_vec(&value)
            .map(Bytes::from)
            .map_err(|e| FerryError::serialization(format!("failed to encode JSON: {e}")))
    }
}

/// Forwards payloads untouched. Empty bodies are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSerializer;

impl Serializer for RawSerializer {
    fn serialize(&self, raw: &Bytes) -> Result<Bytes> {
        if raw.is_empty() {
            return Err(FerryError::serialization("payload is empty"));
        }
        Ok(raw.clone())
    }
}

/// Serializer selection as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// [`JsonSerializer`].
    #[default]
    Json,
    /// [`RawSerializer`].
    Raw,
}

impl SerializationFormat {
    /// Instantiates the selected serializer.
    pub fn build(self) -> Arc<dyn Serializer> {
        match self {
            Self::Json => Arc::new(JsonSerializer),
            Self::Raw => Arc::new(RawSerializer),
        }
    }
}

impl FromStr for SerializationFormat {
    type Err = FerryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "raw" => Ok(Self::Raw),
            other => Err(FerryError::config(format!("unknown serialization format `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_serializer_compacts_valid_payload() {
        let raw = Bytes::from_static(b"{ \"event\" : \"user.created\",\n \"id\": 7 }");
        let encoded = JsonSerializer.serialize(&raw).unwrap();

        assert_eq!(&encoded[..], br#"{"event":"user.created","id":7}"#);
    }

    #[test]
    fn json_serializer_rejects_invalid_payload() {
        let error = JsonSerializer.serialize(&Bytes::from_static(b"{not json")).unwrap_err();

        assert_eq!(error.code(), "E3002");
        assert!(error.is_client_error());
    }

    #[test]
    fn raw_serializer_passes_bytes_through() {
        let raw = Bytes::from_static(b"\x00\x01binary");
        assert_eq!(RawSerializer.serialize(&raw).unwrap(), raw);
        assert!(RawSerializer.serialize(&Bytes::new()).is_err());
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<SerializationFormat>().unwrap(), SerializationFormat::Json);
        assert_eq!(" raw ".parse::<SerializationFormat>().unwrap(), SerializationFormat::Raw);
        assert!("avro".parse::<SerializationFormat>().is_err());
    }
}
