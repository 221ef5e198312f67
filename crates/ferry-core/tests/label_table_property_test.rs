//! Property-based tests for label table invariants.
//!
//! Every label that survives validation must point inside its topic's
//! partition range, and a single bad label must reject the whole table.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;

use ferry_core::{FerryError, LabelSpec, PartitionLabelTable, PartitionSelector, TopicMetadata};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};

/// Deterministic property test configuration for CI stability.
fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        fork: false,
        failure_persistence: None,
        source_file: None,
        ..ProptestConfig::default()
    }
}

/// Topics with partition counts between 1 and 16.
fn metadata_strategy() -> impl Strategy<Value = HashMap<String, TopicMetadata>> {
    prop::collection::hash_map(prop::string::string_regex("[a-z][a-z0-9-]{0,11}").unwrap(), 1..=16i32, 1..5)
        .prop_map(|topics| {
            topics
                .into_iter()
                .map(|(topic, partition_count)| {
                    (topic.clone(), TopicMetadata { topic, partition_count })
                })
                .collect()
        })
}

/// Label specs over the given topics with partitions in `-2..20`.
fn specs_for(
    metadata: &HashMap<String, TopicMetadata>,
) -> impl Strategy<Value = Vec<LabelSpec>> {
    let topics: Vec<String> = metadata.keys().cloned().collect();
    prop::collection::vec((prop::sample::select(topics), -2..20i32), 1..12).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (topic, partition))| LabelSpec { label: format!("label-{i}"), topic, partition })
            .collect()
    })
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Resolved partitions always satisfy `0 <= id < partition_count`, and
    /// the table builds exactly when every spec is in range.
    #[test]
    fn resolved_partitions_are_in_range(
        (metadata, specs) in metadata_strategy().prop_flat_map(|metadata| {
            let specs = specs_for(&metadata);
            (Just(metadata), specs)
        })
    ) {
        let all_in_range = specs
            .iter()
            .all(|spec| spec.partition >= 0 && spec.partition < metadata[&spec.topic].partition_count);

        match PartitionLabelTable::build(&specs, &metadata) {
            Ok(table) => {
                prop_assert!(all_in_range);
                prop_assert_eq!(table.len(), specs.len());

                for spec in &specs {
                    let route = table.resolve(&spec.label).unwrap();
                    let PartitionSelector::Explicit(id) = route.partition else {
                        return Err(TestCaseError::fail("labels must resolve to explicit partitions"));
                    };
                    prop_assert!(id >= 0 && id < metadata[&route.topic].partition_count);
                    prop_assert_eq!(&route.topic, &spec.topic);
                }
            },
            Err(error) => {
                prop_assert!(!all_in_range);
                let is_range_error = matches!(error, FerryError::PartitionOutOfRange { .. });
                prop_assert!(is_range_error);
            },
        }
    }

    /// Formatting a spec and parsing it back yields the same spec.
    #[test]
    fn label_spec_display_parses_back(
        label in "[a-z][a-z0-9_]{0,15}",
        topic in "[a-z][a-z0-9.-]{0,15}",
        partition in 0..1024i32,
    ) {
        let spec = LabelSpec { label, topic, partition };
        let parsed: LabelSpec = spec.to_string().parse().unwrap();
        prop_assert_eq!(parsed, spec);
    }
}

#[test]
fn empty_table_resolves_nothing() {
    let table = PartitionLabelTable::empty();

    assert!(table.is_empty());
    assert!(table.resolve("orders").is_none());
}
