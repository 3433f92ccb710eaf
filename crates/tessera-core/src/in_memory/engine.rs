//! Reference storage engine over a process-local map.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::engine::{ReadPredicate, StorageEngine, expected_version_of, validate_batch};
use crate::error::EventStoreError;
use crate::event::StorageEvent;
use crate::scan::{IteratorExt, forward_end};

use super::notify::{ObserverRegistry, StreamChanged, Subscription};

/// In-memory storage engine.
///
/// Intended for tests, local development and as the behavioural baseline
/// the durable engines are checked against. Streams are independent map
/// entries; appends and deletes take the map's write lock only for the
/// mutation itself. Observers run after the lock is released, so a slow
/// observer delays later appends' notifications but not reads or writes.
#[derive(Debug, Default)]
pub struct InMemoryStorageEngine {
    streams: RwLock<HashMap<String, Vec<StorageEvent>>>,
    observers: Arc<ObserverRegistry>,
}

impl InMemoryStorageEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer called with the new events of every successful
    /// append.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&StreamChanged) + Send + Sync + 'static,
    {
        self.observers.register(observer)
    }

    /// Number of currently registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

#[async_trait]
impl StorageEngine for InMemoryStorageEngine {
    async fn initialise(&self) -> Result<(), EventStoreError> {
        Ok(())
    }

    #[instrument(skip(self, events), fields(event_count = events.len()))]
    async fn append_to_stream(
        &self,
        stream_id: &str,
        events: Vec<StorageEvent>,
    ) -> Result<(), EventStoreError> {
        let Some(expected) = expected_version_of(&events) else {
            return Ok(());
        };
        validate_batch(stream_id, &events)?;

        let mut streams = self.streams.write().await;
        let actual = streams
            .get(stream_id)
            .and_then(|stream| stream.last())
            .map_or(0, |last| last.event_number);
        if actual != expected {
            debug!(expected, actual, "rejecting stale append");
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id: stream_id.to_owned(),
                expected,
                actual: Some(actual),
            });
        }
        streams
            .entry(stream_id.to_owned())
            .or_default()
            .extend(events.iter().cloned());
        self.observers.enqueue(StreamChanged { new_events: events });
        drop(streams);

        self.observers.deliver_pending();

        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_stream_forwards(
        &self,
        stream_id: &str,
        start: i64,
        count: i64,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        let end = forward_end(start, count);
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.event_number >= start && e.event_number < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    #[instrument(skip(self, read_from_here))]
    async fn read_stream_forwards_from_last(
        &self,
        stream_id: &str,
        read_from_here: &ReadPredicate<'_>,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        let streams = self.streams.read().await;
        let Some(stream) = streams.get(stream_id) else {
            return Ok(Vec::new());
        };
        let mut events: Vec<StorageEvent> = stream
            .iter()
            .rev()
            .take_until_inclusive(|e| read_from_here(*e))
            .cloned()
            .collect();
        events.reverse();
        Ok(events)
    }

    #[instrument(skip(self))]
    async fn delete_stream(&self, stream_id: &str) -> Result<(), EventStoreError> {
        let removed = self.streams.write().await.remove(stream_id);
        debug!(
            deleted = removed.as_ref().map_or(0, Vec::len),
            "stream deleted"
        );
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
