//! Behaviour every storage engine must share.
//!
//! Each check runs against an [`EventStore`] built by [`conformance_store`]
//! and works on its own fresh stream, so the checks can share one engine
//! and run in any order. Engine test suites call [`run_all`] or pick
//! individual checks.

use std::sync::Arc;

use tessera_core::engine::StorageEngine;
use tessera_core::error::EventStoreError;
use tessera_core::store::EventStore;

use crate::events::{
    OrderCreated, OrderDispatched, OrderSnapshot, TestMetadata, fixture_type_map, new_stream_id,
    order_created, order_dispatched, order_snapshot, with_correlation,
};

/// Wraps `engine` in a store that knows the fixture types.
#[must_use]
pub fn conformance_store(engine: Arc<dyn StorageEngine>) -> EventStore {
    EventStore::with_type_map(engine, Arc::new(fixture_type_map()))
}

/// Runs every check in this module against `store`.
///
/// # Panics
///
/// Panics on the first check that fails.
pub async fn run_all(store: &EventStore) {
    appending_to_new_stream_numbers_from_one(store).await;
    appending_batch_persists_all_fields(store).await;
    appending_to_existing_stream_continues_numbering(store).await;
    stale_append_conflicts_and_writes_nothing(store).await;
    append_ahead_of_stream_conflicts(store).await;
    concurrent_appends_have_single_winner(store).await;
    reading_range_returns_window(store).await;
    reading_missing_stream_is_empty(store).await;
    reading_from_last_snapshot_returns_tail(store).await;
    reading_from_last_without_snapshot_returns_whole_stream(store).await;
    deleting_stream_removes_only_that_stream(store).await;
    deleted_stream_starts_again_from_version_zero(store).await;
}

/// # Panics
///
/// Panics if the check fails.
pub async fn appending_to_new_stream_numbers_from_one(store: &EventStore) {
    let stream_id = new_stream_id();

    store
        .append_to_stream(&stream_id, 0, vec![order_created(&stream_id)])
        .await
        .unwrap();

    let events = store.read_stream_forwards(&stream_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_number, 1);
    assert_eq!(events[0].stream_id, stream_id);
    assert_eq!(events[0].body_type, "OrderCreated");
}

/// # Panics
///
/// Panics if the check fails.
pub async fn appending_batch_persists_all_fields(store: &EventStore) {
    let stream_id = new_stream_id();
    let created = with_correlation(order_created(&stream_id), "corr-1");
    let created_id = created.event_id;

    store
        .append_to_stream(&stream_id, 0, vec![created, order_dispatched(&stream_id)])
        .await
        .unwrap();

    let events = store.read_stream_forwards(&stream_id).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_id, created_id);
    assert_eq!(events[0].metadata_type.as_deref(), Some("TestMetadata"));
    assert_eq!(
        events[0].metadata_as::<TestMetadata>().unwrap(),
        Some(TestMetadata {
            correlation_id: "corr-1".to_owned()
        })
    );
    assert_eq!(
        events[0].decode_body::<OrderCreated>(store.type_map()).unwrap(),
        OrderCreated {
            order_id: stream_id.clone()
        }
    );
    assert_eq!(events[1].event_number, 2);
    assert!(events[1].body_is::<OrderDispatched>(store.type_map()));
    assert!(events[1].metadata.is_none());
    assert!(events[1].metadata_type.is_none());
}

/// # Panics
///
/// Panics if the check fails.
pub async fn appending_to_existing_stream_continues_numbering(store: &EventStore) {
    let stream_id = new_stream_id();
    store
        .append_to_stream(&stream_id, 0, vec![order_created(&stream_id)])
        .await
        .unwrap();

    let appended = store
        .append_to_stream(
            &stream_id,
            1,
            vec![order_dispatched(&stream_id), order_snapshot(&stream_id, true)],
        )
        .await
        .unwrap();

    let appended_numbers: Vec<i64> = appended.iter().map(|e| e.event_number).collect();
    assert_eq!(appended_numbers, vec![2, 3]);
    let numbers: Vec<i64> = store
        .read_stream_forwards(&stream_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.event_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

/// # Panics
///
/// Panics if the check fails.
pub async fn stale_append_conflicts_and_writes_nothing(store: &EventStore) {
    let stream_id = new_stream_id();
    store
        .append_to_stream(&stream_id, 0, vec![order_created(&stream_id)])
        .await
        .unwrap();

    let result = store
        .append_to_stream(
            &stream_id,
            0,
            vec![order_dispatched(&stream_id), order_dispatched(&stream_id)],
        )
        .await;

    match result {
        Err(EventStoreError::ConcurrencyConflict {
            stream_id: conflicting,
            expected,
            ..
        }) => {
            assert_eq!(conflicting, stream_id);
            assert_eq!(expected, 0);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    let events = store.read_stream_forwards(&stream_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].body_type, "OrderCreated");
}

/// # Panics
///
/// Panics if the check fails.
pub async fn append_ahead_of_stream_conflicts(store: &EventStore) {
    let stream_id = new_stream_id();

    let result = store
        .append_to_stream(&stream_id, 5, vec![order_created(&stream_id)])
        .await;

    assert!(
        result.as_ref().is_err_and(EventStoreError::is_concurrency_conflict),
        "expected ConcurrencyConflict, got {result:?}"
    );
    assert!(store.read_stream_forwards(&stream_id).await.unwrap().is_empty());
}

/// # Panics
///
/// Panics if the check fails.
pub async fn concurrent_appends_have_single_winner(store: &EventStore) {
    let stream_id = new_stream_id();
    let first_store = store.clone();
    let second_store = store.clone();
    let first_stream = stream_id.clone();
    let second_stream = stream_id.clone();

    let first = tokio::spawn(async move {
        first_store
            .append_to_stream(&first_stream, 0, vec![order_created(&first_stream)])
            .await
    });
    let second = tokio::spawn(async move {
        second_store
            .append_to_stream(&second_stream, 0, vec![order_created(&second_stream)])
            .await
    });
    let results = [first.await.unwrap(), second.await.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| r.as_ref().is_err_and(EventStoreError::is_concurrency_conflict))
        .count();
    assert_eq!(winners, 1, "results: {results:?}");
    assert_eq!(conflicts, 1, "results: {results:?}");
    assert_eq!(store.read_stream_forwards(&stream_id).await.unwrap().len(), 1);
}

/// # Panics
///
/// Panics if the check fails.
pub async fn reading_range_returns_window(store: &EventStore) {
    let stream_id = new_stream_id();
    let events = (0..5).map(|_| order_dispatched(&stream_id)).collect();
    store.append_to_stream(&stream_id, 0, events).await.unwrap();

    let window = store
        .read_stream_forwards_range(&stream_id, 2, 3)
        .await
        .unwrap();
    let past_end = store
        .read_stream_forwards_range(&stream_id, 4, 10)
        .await
        .unwrap();
    let nothing = store
        .read_stream_forwards_range(&stream_id, 2, 0)
        .await
        .unwrap();

    let numbers: Vec<i64> = window.iter().map(|e| e.event_number).collect();
    assert_eq!(numbers, vec![2, 3, 4]);
    let numbers: Vec<i64> = past_end.iter().map(|e| e.event_number).collect();
    assert_eq!(numbers, vec![4, 5]);
    assert!(nothing.is_empty());
}

/// # Panics
///
/// Panics if the check fails.
pub async fn reading_missing_stream_is_empty(store: &EventStore) {
    let stream_id = new_stream_id();

    assert!(store.read_stream_forwards(&stream_id).await.unwrap().is_empty());
    assert!(
        store
            .read_stream_forwards_from_last_of::<OrderSnapshot>(&stream_id)
            .await
            .unwrap()
            .is_empty()
    );
}

/// # Panics
///
/// Panics if the check fails.
pub async fn reading_from_last_snapshot_returns_tail(store: &EventStore) {
    let stream_id = new_stream_id();
    store
        .append_to_stream(
            &stream_id,
            0,
            vec![
                order_created(&stream_id),
                order_snapshot(&stream_id, false),
                order_dispatched(&stream_id),
                order_snapshot(&stream_id, true),
                order_dispatched(&stream_id),
            ],
        )
        .await
        .unwrap();

    let events = store
        .read_stream_forwards_from_last_of::<OrderSnapshot>(&stream_id)
        .await
        .unwrap();

    let numbers: Vec<i64> = events.iter().map(|e| e.event_number).collect();
    assert_eq!(numbers, vec![4, 5]);
    assert_eq!(
        events[0].body_as::<OrderSnapshot>().unwrap(),
        OrderSnapshot {
            order_id: stream_id.clone(),
            dispatched: true
        }
    );
}

/// # Panics
///
/// Panics if the check fails.
pub async fn reading_from_last_without_snapshot_returns_whole_stream(store: &EventStore) {
    let stream_id = new_stream_id();
    store
        .append_to_stream(
            &stream_id,
            0,
            vec![order_created(&stream_id), order_dispatched(&stream_id)],
        )
        .await
        .unwrap();

    let events = store
        .read_stream_forwards_from_last_of::<OrderSnapshot>(&stream_id)
        .await
        .unwrap();

    let numbers: Vec<i64> = events.iter().map(|e| e.event_number).collect();
    assert_eq!(numbers, vec![1, 2]);
}

/// # Panics
///
/// Panics if the check fails.
pub async fn deleting_stream_removes_only_that_stream(store: &EventStore) {
    let doomed = new_stream_id();
    let survivor = new_stream_id();
    for stream_id in [&doomed, &survivor] {
        store
            .append_to_stream(
                stream_id,
                0,
                vec![order_created(stream_id), order_dispatched(stream_id)],
            )
            .await
            .unwrap();
    }

    store.delete_stream(&doomed).await.unwrap();

    assert!(store.read_stream_forwards(&doomed).await.unwrap().is_empty());
    assert_eq!(store.read_stream_forwards(&survivor).await.unwrap().len(), 2);
    store.delete_stream(&doomed).await.unwrap();
}

/// # Panics
///
/// Panics if the check fails.
pub async fn deleted_stream_starts_again_from_version_zero(store: &EventStore) {
    let stream_id = new_stream_id();
    store
        .append_to_stream(
            &stream_id,
            0,
            vec![order_created(&stream_id), order_dispatched(&stream_id)],
        )
        .await
        .unwrap();
    store.delete_stream(&stream_id).await.unwrap();

    store
        .append_to_stream(&stream_id, 0, vec![order_created(&stream_id)])
        .await
        .unwrap();

    let events = store.read_stream_forwards(&stream_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_number, 1);
}
