//! Shared test engines, fixtures and utilities for Tessera.

mod clock;
pub mod conformance;
mod engine;
pub mod events;

pub use clock::{FixedClock, ManualClock};
pub use engine::{
    ConflictingStorageEngine, EmptyStorageEngine, FailingStorageEngine, RecordingStorageEngine,
};
