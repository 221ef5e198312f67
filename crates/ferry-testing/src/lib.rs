//! Test doubles for the Ferry workspace.
//!
//! Provides an in-memory [`MockProducer`] with manual acknowledgments, a
//! [`LogCapture`] layer for asserting on emitted log records, and payload
//! fixtures. Nothing here talks to a real broker.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod fixtures;
pub mod logs;
pub mod producer;

pub use fixtures::{json_event, keyed_message, label_table};
pub use logs::{CaptureLayer, CapturedRecord, LogCapture};
pub use producer::{MockProducer, MockProducerBuilder};
