//! Test engines — mock `StorageEngine` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tessera_core::engine::{ReadPredicate, StorageEngine};
use tessera_core::error::EventStoreError;
use tessera_core::event::StorageEvent;

/// A storage engine that records every append and delete. Reads return the
/// configured events, filtered the way a real engine would filter them, and
/// every write succeeds.
#[derive(Debug, Default)]
pub struct RecordingStorageEngine {
    read_result: Mutex<Vec<StorageEvent>>,
    appended: Mutex<Vec<(String, Vec<StorageEvent>)>>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingStorageEngine {
    /// Create a recording engine whose reads are served from `read_result`.
    #[must_use]
    pub fn new(read_result: Vec<StorageEvent>) -> Self {
        Self {
            read_result: Mutex::new(read_result),
            ..Self::default()
        }
    }

    /// Returns a snapshot of all batches that were appended.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(String, Vec<StorageEvent>)> {
        self.appended.lock().unwrap().clone()
    }

    /// Returns the stream ids passed to `delete_stream`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn deleted_streams(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageEngine for RecordingStorageEngine {
    async fn initialise(&self) -> Result<(), EventStoreError> {
        Ok(())
    }

    async fn append_to_stream(
        &self,
        stream_id: &str,
        events: Vec<StorageEvent>,
    ) -> Result<(), EventStoreError> {
        self.appended
            .lock()
            .unwrap()
            .push((stream_id.to_owned(), events));
        Ok(())
    }

    async fn read_stream_forwards(
        &self,
        stream_id: &str,
        start: i64,
        count: i64,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        let end = start.saturating_add(count);
        Ok(self
            .read_result
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.stream_id == stream_id)
            .filter(|e| e.event_number >= start && e.event_number < end)
            .cloned()
            .collect())
    }

    async fn read_stream_forwards_from_last(
        &self,
        stream_id: &str,
        read_from_here: &ReadPredicate<'_>,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        let events = self.read_result.lock().unwrap();
        let stream: Vec<&StorageEvent> =
            events.iter().filter(|e| e.stream_id == stream_id).collect();
        let from = stream
            .iter()
            .rposition(|e| read_from_here(*e))
            .unwrap_or(0);
        Ok(stream[from..].iter().map(|e| (*e).clone()).collect())
    }

    async fn delete_stream(&self, stream_id: &str) -> Result<(), EventStoreError> {
        self.deleted.lock().unwrap().push(stream_id.to_owned());
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// A storage engine that holds nothing and silently accepts writes. Useful
/// for "stream not found" scenarios.
#[derive(Debug)]
pub struct EmptyStorageEngine;

#[async_trait]
impl StorageEngine for EmptyStorageEngine {
    async fn initialise(&self) -> Result<(), EventStoreError> {
        Ok(())
    }

    async fn append_to_stream(
        &self,
        _stream_id: &str,
        _events: Vec<StorageEvent>,
    ) -> Result<(), EventStoreError> {
        Ok(())
    }

    async fn read_stream_forwards(
        &self,
        _stream_id: &str,
        _start: i64,
        _count: i64,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        Ok(vec![])
    }

    async fn read_stream_forwards_from_last(
        &self,
        _stream_id: &str,
        _read_from_here: &ReadPredicate<'_>,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        Ok(vec![])
    }

    async fn delete_stream(&self, _stream_id: &str) -> Result<(), EventStoreError> {
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// A storage engine whose backend is unreachable. Every operation fails with
/// `EventStoreError::Backend` and the health check reports `false`.
#[derive(Debug)]
pub struct FailingStorageEngine;

fn unreachable_backend() -> EventStoreError {
    EventStoreError::backend("connection refused")
}

#[async_trait]
impl StorageEngine for FailingStorageEngine {
    async fn initialise(&self) -> Result<(), EventStoreError> {
        Err(unreachable_backend())
    }

    async fn append_to_stream(
        &self,
        _stream_id: &str,
        _events: Vec<StorageEvent>,
    ) -> Result<(), EventStoreError> {
        Err(unreachable_backend())
    }

    async fn read_stream_forwards(
        &self,
        _stream_id: &str,
        _start: i64,
        _count: i64,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        Err(unreachable_backend())
    }

    async fn read_stream_forwards_from_last(
        &self,
        _stream_id: &str,
        _read_from_here: &ReadPredicate<'_>,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        Err(unreachable_backend())
    }

    async fn delete_stream(&self, _stream_id: &str) -> Result<(), EventStoreError> {
        Err(unreachable_backend())
    }

    async fn is_healthy(&self) -> bool {
        false
    }
}

/// A storage engine that rejects every append as a concurrency conflict the
/// way a backend does when it cannot report the stream's actual version.
#[derive(Debug)]
pub struct ConflictingStorageEngine;

#[async_trait]
impl StorageEngine for ConflictingStorageEngine {
    async fn initialise(&self) -> Result<(), EventStoreError> {
        Ok(())
    }

    async fn append_to_stream(
        &self,
        stream_id: &str,
        events: Vec<StorageEvent>,
    ) -> Result<(), EventStoreError> {
        Err(EventStoreError::ConcurrencyConflict {
            stream_id: stream_id.to_owned(),
            expected: events.first().map_or(0, |e| e.event_number - 1),
            actual: None,
        })
    }

    async fn read_stream_forwards(
        &self,
        _stream_id: &str,
        _start: i64,
        _count: i64,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        Ok(vec![])
    }

    async fn read_stream_forwards_from_last(
        &self,
        _stream_id: &str,
        _read_from_here: &ReadPredicate<'_>,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        Ok(vec![])
    }

    async fn delete_stream(&self, _stream_id: &str) -> Result<(), EventStoreError> {
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
