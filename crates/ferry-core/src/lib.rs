//! Core domain models and event types.
//!
//! Provides the routing primitives, delivery events, producer and serializer
//! seams, and the error taxonomy shared by every Ferry crate. The broker
//! client, the HTTP surface and the test doubles all build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod producer;
pub mod serializer;

pub use error::{ErrorKind, FerryError, Result};
pub use events::{delivery_channel, DeliveryEvent, DeliveryEvents, EventSender};
pub use models::{
    InboundMessage, LabelSpec, OutboundRecord, PartitionId, PartitionLabelTable, PartitionSelector,
    Route, TopicMetadata,
};
pub use producer::Producer;
pub use serializer::{JsonSerializer, RawSerializer, SerializationFormat, Serializer};
