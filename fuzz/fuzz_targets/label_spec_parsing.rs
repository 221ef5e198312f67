#![no_main]

//! Fuzz target for partition label parsing.
//!
//! Label lists come straight from the environment, so malformed input must
//! produce a configuration error and never a panic. Every list that does
//! parse must render back to entries that parse to the same specs.

use ferry_core::LabelSpec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(specs) = LabelSpec::parse_list(input) else {
        return;
    };

    for spec in &specs {
        assert!(!spec.label.is_empty());
        assert!(!spec.topic.is_empty());
    }

    let rendered = specs.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
    if let Ok(reparsed) = LabelSpec::parse_list(&rendered) {
        assert_eq!(reparsed, specs);
    }
});
