//! Property-based tests for routing invariants.
//!
//! Uses randomly generated label sets and requests to check that routing
//! never falls back to the default topic for unknown labels and that every
//! enqueued record lands on a partition that exists.

use std::{collections::BTreeMap, sync::Arc};

use ferry_api::Dispatcher;
use ferry_core::{FerryError, InboundMessage, PartitionSelector, RawSerializer};
use ferry_testing::{label_table, MockProducer};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};

const PARTITIONS: i32 = 8;

/// Creates property test configuration based on environment.
///
/// Uses `PROPTEST_CASES` when set, otherwise 64 cases (256 when `CI=true`).
fn proptest_config() -> ProptestConfig {
    let is_ci = std::env::var("CI").unwrap_or_default() == "true";
    let default_cases = if is_ci { 256 } else { 64 };

    let cases =
        std::env::var("PROPTEST_CASES").ok().and_then(|s| s.parse().ok()).unwrap_or(default_cases);

    ProptestConfig::with_cases(cases)
}

fn label_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,11}"
}

fn labels_strategy() -> impl Strategy<Value = BTreeMap<String, i32>> {
    prop::collection::btree_map(label_strategy(), 0..PARTITIONS, 1..6)
}

fn dispatcher_for(labels: &BTreeMap<String, i32>) -> (Dispatcher, MockProducer) {
    let entries = labels
        .iter()
        .map(|(label, partition)| format!("{label}=events:{partition}"))
        .collect::<Vec<_>>()
        .join(",");

    let (producer, _events) = MockProducer::builder().build();
    let dispatcher = Dispatcher::new(
        label_table(&entries, PARTITIONS).unwrap(),
        Arc::new(producer.clone()),
        Arc::new(RawSerializer),
        "metrics",
    );
    (dispatcher, producer)
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Unknown labels are rejected and never produced anywhere.
    #[test]
    fn unknown_labels_are_never_defaulted(
        labels in labels_strategy(),
        candidate in label_strategy(),
    ) {
        prop_assume!(!labels.contains_key(&candidate));
        let (dispatcher, producer) = dispatcher_for(&labels);

        let result = dispatcher.dispatch(InboundMessage::new(&b"payload"[..]).with_label(candidate.clone()));

        let is_unknown_label = matches!(&result, Err(FerryError::UnknownLabel { label }) if *label == candidate);
        prop_assert!(is_unknown_label);
        prop_assert_eq!(producer.produced_count(), 0);
    }

    /// Every labeled record lands on its configured partition, which is
    /// always inside the topic's partition count.
    #[test]
    fn labeled_records_land_on_configured_partition(
        labels in labels_strategy(),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..20),
    ) {
        let (dispatcher, producer) = dispatcher_for(&labels);
        let names: Vec<&String> = labels.keys().collect();

        for pick in &picks {
            let label = names[pick.index(names.len())];
            let route = dispatcher
                .dispatch(InboundMessage::new(&b"payload"[..]).with_label(label.as_str()))
                .unwrap();

            prop_assert_eq!(route.topic.as_str(), "events");
            prop_assert_eq!(route.partition, PartitionSelector::Explicit(labels[label]));
        }

        let records = producer.records();
        prop_assert_eq!(records.len(), picks.len());
        for record in records {
            let partition = record.partition.partition().unwrap();
            prop_assert!((0..PARTITIONS).contains(&partition));
        }
    }

    /// Unlabeled records always go to the default topic with the partition
    /// left to the broker client.
    #[test]
    fn unlabeled_records_use_default_topic(
        labels in labels_strategy(),
        key in prop::option::of("[a-z0-9]{1,16}"),
    ) {
        let (dispatcher, producer) = dispatcher_for(&labels);

        let mut message = InboundMessage::new(&b"payload"[..]);
        if let Some(key) = key {
            message = message.with_key(key.into_bytes());
        }
        let route = dispatcher.dispatch(message).unwrap();

        prop_assert_eq!(route.topic.as_str(), "metrics");
        prop_assert_eq!(route.partition, PartitionSelector::Unspecified);
        prop_assert_eq!(producer.produced_count(), 1);
    }
}
