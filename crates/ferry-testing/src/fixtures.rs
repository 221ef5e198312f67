//! Payload and label fixtures shared by test suites and benchmarks.

use std::collections::HashMap;

use bytes::Bytes;
use ferry_core::{InboundMessage, LabelSpec, PartitionLabelTable, TopicMetadata};
use serde_json::json;

/// A small JSON event payload tagged with `sequence`.
pub fn json_event(sequence: u64) -> Bytes {
    let body = json!({
        "event": "order.created",
        "sequence": sequence,
        "data": { "amount": 1250, "currency": "EUR" },
    });
    Bytes::from(body.to_string())
}

/// An unlabeled message keyed by `key-{sequence}`.
pub fn keyed_message(sequence: u64) -> InboundMessage {
    InboundMessage::new(json_event(sequence)).with_key(format!("key-{sequence}"))
}

/// Builds a label table from `label=topic:partition` entries, treating every
/// referenced topic as having `partition_count` partitions.
///
/// # Errors
///
/// Fails if the entries do not parse or a partition is out of range.
pub fn label_table(entries: &str, partition_count: i32) -> anyhow::Result<PartitionLabelTable> {
    let specs = LabelSpec::parse_list(entries)?;
    let metadata: HashMap<_, _> = LabelSpec::topics(&specs)
        .into_iter()
        .map(|topic| (topic.to_string(), TopicMetadata { topic: topic.to_string(), partition_count }))
        .collect();

    Ok(PartitionLabelTable::build(&specs, &metadata)?)
}
