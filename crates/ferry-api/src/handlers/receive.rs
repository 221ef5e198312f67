//! Message intake: `POST /receive`.
//!
//! The body is the payload. The partition label and record key come from
//! headers, falling back to query parameters. The response is sent as soon
//! as the record is enqueued, before any delivery outcome is known.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use ferry_core::{FerryError, InboundMessage, PartitionId};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::error_response;
use crate::server::AppState;

/// Header carrying the partition label.
pub const LABEL_HEADER: &str = "x-partition-label";

/// Header carrying the record key.
pub const KEY_HEADER: &str = "x-message-key";

/// Optional routing parameters in the query string.
#[derive(Debug, Default, Deserialize)]
pub struct ReceiveParams {
    /// Partition label.
    pub label: Option<String>,
    /// Record key.
    pub key: Option<String>,
}

/// Response for an accepted message.
#[derive(Debug, Serialize)]
pub struct ReceiveResponse {
    /// Always `accepted`; delivery has not happened yet.
    pub status: &'static str,
    /// Destination topic.
    pub topic: String,
    /// Explicit partition, `null` when the broker client picks one.
    pub partition: Option<PartitionId>,
}

/// Label requested by the caller, from the header or else the query.
///
/// A label that is present but blank or not UTF-8 cannot name a table
/// entry and is rejected rather than treated as absent.
fn requested_label(headers: &HeaderMap, query: Option<String>) -> Result<Option<String>, FerryError> {
    let label = match headers.get(LABEL_HEADER) {
        Some(value) => std::str::from_utf8(value.as_bytes())
            .map_err(|_| FerryError::unknown_label(String::from_utf8_lossy(value.as_bytes())))?
            .trim()
            .to_string(),
        None => match query {
            Some(label) => label.trim().to_string(),
            None => return Ok(None),
        },
    };

    if label.is_empty() {
        return Err(FerryError::unknown_label(label));
    }
    Ok(Some(label))
}

/// Record key from the header or else the query. Keys are opaque bytes, a
/// blank key means none.
fn requested_key(headers: &HeaderMap, query: Option<String>) -> Option<Bytes> {
    let key = match headers.get(KEY_HEADER) {
        Some(value) => Bytes::copy_from_slice(value.as_bytes().trim_ascii()),
        None => Bytes::from(query?.trim().to_string()),
    };
    (!key.is_empty()).then_some(key)
}

/// Accepts a message and hands it to the producer.
///
/// Returns `202 Accepted` once the record is enqueued. Delivery failures
/// are reported only through logs and metrics.
///
/// # Errors
///
/// - 400: unknown partition label or unserializable payload
/// - 413: payload above the configured limit
/// - 500: producer queue full or enqueue refused
#[instrument(
    name = "receive_message",
    skip(state, params, headers, body),
    fields(payload_bytes = body.len(), label = tracing::field::Empty)
)]
pub async fn receive_message(
    State(state): State<AppState>,
    Query(params): Query<ReceiveParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let label = match requested_label(&headers, params.label) {
        Ok(label) => label,
        Err(error) => {
            let error = state.dispatcher.reject(error);
            warn!(code = error.code(), error = %error, "message rejected");
            return error_response(&error);
        },
    };
    let key = requested_key(&headers, params.key);

    if let Some(label) = &label {
        tracing::Span::current().record("label", label.as_str());
    }

    let mut message = InboundMessage::new(body);
    if let Some(label) = label {
        message = message.with_label(label);
    }
    if let Some(key) = key {
        message = message.with_key(key);
    }

    match state.dispatcher.dispatch(message) {
        Ok(route) => {
            let response = ReceiveResponse {
                status: "accepted",
                topic: route.topic,
                partition: route.partition.partition(),
            };
            (StatusCode::ACCEPTED, Json(response)).into_response()
        },
        Err(error) => {
            warn!(code = error.code(), error = %error, "message rejected");
            error_response(&error)
        },
    }
}
