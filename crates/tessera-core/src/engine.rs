//! Storage engine contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EventStoreError;
use crate::event::StorageEvent;

/// Predicate evaluated during a backward scan.
pub type ReadPredicate<'a> = dyn Fn(&StorageEvent) -> bool + Send + Sync + 'a;

/// Capability set every storage backend implements.
///
/// Engines own physical storage and the optimistic concurrency check. The
/// expected version of an append is implied by its first event:
/// `events[0].event_number - 1`. Checking it and writing the batch must be
/// one atomic step with respect to other appenders on the same stream.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Idempotent one-time setup. An error here is fatal for the engine.
    async fn initialise(&self) -> Result<(), EventStoreError>;

    /// Atomically appends a contiguous batch of events.
    ///
    /// Fails with `EventStoreError::ConcurrencyConflict` without writing
    /// anything when the stream version is not the one the batch expects.
    async fn append_to_stream(
        &self,
        stream_id: &str,
        events: Vec<StorageEvent>,
    ) -> Result<(), EventStoreError>;

    /// Reads events numbered `[start, start + count)` in ascending order.
    async fn read_stream_forwards(
        &self,
        stream_id: &str,
        start: i64,
        count: i64,
    ) -> Result<Vec<StorageEvent>, EventStoreError>;

    /// Scans from the newest event backward, stopping after the first event
    /// that satisfies `read_from_here`. Returns the scanned events ascending.
    async fn read_stream_forwards_from_last(
        &self,
        stream_id: &str,
        read_from_here: &ReadPredicate<'_>,
    ) -> Result<Vec<StorageEvent>, EventStoreError>;

    /// Removes every event of the stream as one logical operation.
    async fn delete_stream(&self, stream_id: &str) -> Result<(), EventStoreError>;

    /// Lightweight liveness check. Never fails.
    async fn is_healthy(&self) -> bool;
}

#[async_trait]
impl<E> StorageEngine for Arc<E>
where
    E: StorageEngine + ?Sized,
{
    async fn initialise(&self) -> Result<(), EventStoreError> {
        (**self).initialise().await
    }

    async fn append_to_stream(
        &self,
        stream_id: &str,
        events: Vec<StorageEvent>,
    ) -> Result<(), EventStoreError> {
        (**self).append_to_stream(stream_id, events).await
    }

    async fn read_stream_forwards(
        &self,
        stream_id: &str,
        start: i64,
        count: i64,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        (**self).read_stream_forwards(stream_id, start, count).await
    }

    async fn read_stream_forwards_from_last(
        &self,
        stream_id: &str,
        read_from_here: &ReadPredicate<'_>,
    ) -> Result<Vec<StorageEvent>, EventStoreError> {
        (**self)
            .read_stream_forwards_from_last(stream_id, read_from_here)
            .await
    }

    async fn delete_stream(&self, stream_id: &str) -> Result<(), EventStoreError> {
        (**self).delete_stream(stream_id).await
    }

    async fn is_healthy(&self) -> bool {
        (**self).is_healthy().await
    }
}

/// Version a batch expects the stream to be at, or `None` for an empty batch.
#[must_use]
pub fn expected_version_of(events: &[StorageEvent]) -> Option<i64> {
    events.first().map(|e| e.event_number - 1)
}

/// Checks that a batch targets `stream_id` and is numbered contiguously.
///
/// # Errors
///
/// Returns `EventStoreError::Validation` describing the first offending event.
pub fn validate_batch(stream_id: &str, events: &[StorageEvent]) -> Result<(), EventStoreError> {
    let Some(first) = events.first() else {
        return Ok(());
    };
    if first.event_number < 1 {
        return Err(EventStoreError::Validation(format!(
            "event numbers start at 1, got {}",
            first.event_number
        )));
    }
    for (expected_number, event) in (first.event_number..).zip(events) {
        if event.stream_id != stream_id {
            return Err(EventStoreError::Validation(format!(
                "event {} belongs to stream {}, not {stream_id}",
                event.event_id, event.stream_id
            )));
        }
        if event.event_number != expected_number {
            return Err(EventStoreError::Validation(format!(
                "batch is not contiguous: expected event number {expected_number}, got {}",
                event.event_number
            )));
        }
    }
    Ok(())
}
