//! Reference in-memory storage engine and its change notification hook.

mod engine;
mod notify;

pub use engine::InMemoryStorageEngine;
pub use notify::{StreamChanged, Subscription};
