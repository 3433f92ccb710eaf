//! Tessera Core — event model, storage engine contract and event store façade.
//!
//! This crate defines the types every storage backend and every caller
//! depends on, plus the in-memory reference engine. Durable backends live
//! in their own crates and plug in through [`engine::StorageEngine`].

pub mod clock;
pub mod engine;
pub mod error;
pub mod event;
pub mod in_memory;
pub mod record;
pub mod scan;
pub mod store;
pub mod type_map;

pub use engine::StorageEngine;
pub use error::EventStoreError;
pub use event::{EventData, Payload, StorageEvent};
pub use store::EventStore;
