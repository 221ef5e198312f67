//! Routing primitives and the partition label table.
//!
//! Defines inbound messages, the records handed to the producer, label
//! specifications as configured, and the immutable label table produced by
//! startup metadata sync.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    str::FromStr,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{FerryError, Result};

/// Broker partition index.
pub type PartitionId = i32;

/// Partition placement requested for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionSelector {
    /// Write to exactly this partition.
    Explicit(PartitionId),
    /// Let the broker client place the record (key hash or round robin).
    Unspecified,
}

impl PartitionSelector {
    /// Returns the explicit partition, if any.
    pub const fn partition(self) -> Option<PartitionId> {
        match self {
            Self::Explicit(partition) => Some(partition),
            Self::Unspecified => None,
        }
    }
}

impl fmt::Display for PartitionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(partition) => write!(f, "{partition}"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// A payload received from a caller, before routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Raw request body.
    pub payload: Bytes,
    /// Optional partition label chosen by the caller.
    pub label: Option<String>,
    /// Optional record key.
    pub key: Option<Bytes>,
}

impl InboundMessage {
    /// Creates an unlabeled, unkeyed message.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self { payload: payload.into(), label: None, key: None }
    }

    /// Sets the routing label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the record key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Resolved destination of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    /// Destination topic.
    pub topic: String,
    /// Partition placement.
    pub partition: PartitionSelector,
}

/// A fully routed and serialized record ready for the producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    /// Destination topic.
    pub topic: String,
    /// Partition placement.
    pub partition: PartitionSelector,
    /// Optional record key.
    pub key: Option<Bytes>,
    /// Serialized value.
    pub value: Bytes,
}

impl OutboundRecord {
    /// Builds a record from a resolved route.
    pub fn new(route: Route, key: Option<Bytes>, value: Bytes) -> Self {
        Self { topic: route.topic, partition: route.partition, key, value }
    }
}

/// Label mapping as configured, not yet checked against the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSpec {
    /// Human-readable label.
    pub label: String,
    /// Topic the label routes to.
    pub topic: String,
    /// Partition the label routes to.
    pub partition: PartitionId,
}

impl LabelSpec {
    /// Parses a comma separated list of `label=topic:partition` entries.
    ///
    /// Blank input yields an empty list. Duplicate labels are rejected since
    /// only one destination can win.
    ///
    /// # Example
    ///
    /// ```
    /// use ferry_core::LabelSpec;
    ///
    /// let specs = LabelSpec::parse_list("orders=events:3, audit=audit-log:0").unwrap();
    /// assert_eq!(specs.len(), 2);
    /// assert_eq!(specs[0].topic, "events");
    /// assert_eq!(specs[0].partition, 3);
    /// ```
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        let mut seen = BTreeSet::new();
        let mut specs = Vec::new();

        for entry in input.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let spec: Self = entry.parse()?;
            if !seen.insert(spec.label.clone()) {
                return Err(FerryError::config(format!("duplicate partition label `{}`", spec.label)));
            }
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Distinct topics referenced by a set of specs, in sorted order.
    pub fn topics(specs: &[Self]) -> BTreeSet<&str> {
        specs.iter().map(|spec| spec.topic.as_str()).collect()
    }
}

impl FromStr for LabelSpec {
    type Err = FerryError;

    fn from_str(entry: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            FerryError::config(format!(
                "invalid partition label `{entry}`: {reason} (expected label=topic:partition)"
            ))
        };

        let (label, target) = entry.split_once('=').ok_or_else(|| invalid("missing `=`"))?;
        let (topic, partition) = target.rsplit_once(':').ok_or_else(|| invalid("missing `:`"))?;

        let label = label.trim();
        let topic = topic.trim();
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if topic.is_empty() {
            return Err(invalid("empty topic"));
        }

        let partition =
            partition.trim().parse::<PartitionId>().map_err(|_| invalid("partition is not a number"))?;

        Ok(Self { label: label.to_string(), topic: topic.to_string(), partition })
    }
}

impl fmt::Display for LabelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}:{}", self.label, self.topic, self.partition)
    }
}

/// Partition count observed for a topic during startup sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    /// Topic name.
    pub topic: String,
    /// Number of partitions reported by the broker.
    pub partition_count: i32,
}

impl TopicMetadata {
    /// Returns whether `partition` exists on this topic.
    pub const fn contains(&self, partition: PartitionId) -> bool {
        partition >= 0 && partition < self.partition_count
    }
}

/// Immutable label to (topic, partition) mapping.
///
/// Only constructed from specs that were checked against broker metadata, so
/// every entry is known to point at an existing partition. Shared read-only
/// by all request handlers after startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionLabelTable {
    entries: HashMap<String, (String, PartitionId)>,
}

impl PartitionLabelTable {
    /// A table with no labels; every labeled request fails routing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates every spec against the observed metadata and builds the
    /// table.
    ///
    /// Either every label is valid and the full table is returned, or the
    /// first violation is returned and nothing is built.
    ///
    /// # Errors
    ///
    /// - `TopicNotFound` if a spec references a topic missing from `metadata`
    /// - `PartitionOutOfRange` if a spec's partition is outside
    ///   `0..partition_count`
    pub fn build(specs: &[LabelSpec], metadata: &HashMap<String, TopicMetadata>) -> Result<Self> {
        let mut entries = HashMap::with_capacity(specs.len());

        for spec in specs {
            let topic = metadata
                .get(&spec.topic)
                .ok_or_else(|| FerryError::TopicNotFound { topic: spec.topic.clone() })?;

            if !topic.contains(spec.partition) {
                return Err(FerryError::PartitionOutOfRange {
                    label: spec.label.clone(),
                    topic: spec.topic.clone(),
                    partition: spec.partition,
                    partition_count: topic.partition_count,
                });
            }

            entries.insert(spec.label.clone(), (spec.topic.clone(), spec.partition));
        }

        Ok(Self { entries })
    }

    /// Looks up the destination of a label.
    pub fn resolve(&self, label: &str) -> Option<Route> {
        self.entries.get(label).map(|(topic, partition)| Route {
            topic: topic.clone(),
            partition: PartitionSelector::Explicit(*partition),
        })
    }

    /// Number of labels in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the table has no labels.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(label, topic, partition)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, PartitionId)> {
        self.entries
            .iter()
            .map(|(label, (topic, partition))| (label.as_str(), topic.as_str(), *partition))
    }
}
