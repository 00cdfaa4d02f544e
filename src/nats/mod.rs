pub mod client;
pub mod messages;

pub use client::{NatsClient, NatsMetadataStore};
pub use messages::{MetadataEvent, MetadataMessage};
