//! Integration tests for the stream routes.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;
use tessera_core::in_memory::InMemoryStorageEngine;
use tessera_postgres::{PgStorageEngine, PgStorageOptions};

fn order_event(body_type: &str) -> serde_json::Value {
    json!({ "body_type": body_type, "body": { "order_id": "o-1" } })
}

async fn stream_round_trip(app: axum::Router) {
    // POST /api/v1/streams/{stream_id}
    let (status, json) = common::post_json(
        app.clone(),
        "/api/v1/streams/order-1",
        &json!({
            "expected_version": 0,
            "events": [
                order_event("OrderCreated"),
                order_event("OrderSnapshot"),
                order_event("OrderDispatched"),
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version"], 3);

    // GET — whole stream
    let (status, json) = common::get_json(app.clone(), "/api/v1/streams/order-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stream_id"], "order-1");
    let events = json["events"].as_array().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["event_number"], 1);
    assert_eq!(events[0]["body_type"], "OrderCreated");
    assert_eq!(events[0]["body"]["order_id"], "o-1");

    // GET — window
    let (status, json) =
        common::get_json(app.clone(), "/api/v1/streams/order-1?start=2&count=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["events"].as_array().unwrap().len(), 1);
    assert_eq!(json["events"][0]["event_number"], 2);

    // GET — from the last snapshot
    let (status, json) = common::get_json(
        app.clone(),
        "/api/v1/streams/order-1/from-last?body_type=OrderSnapshot",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let numbers: Vec<i64> = json["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_number"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![2, 3]);

    // Stale append
    let (status, json) = common::post_json(
        app.clone(),
        "/api/v1/streams/order-1",
        &json!({ "expected_version": 1, "events": [order_event("OrderDispatched")] }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "concurrency_conflict");

    // DELETE, then the stream is empty and starts again at version 0
    assert_eq!(
        common::delete(app.clone(), "/api/v1/streams/order-1").await,
        StatusCode::NO_CONTENT
    );
    let (_, json) = common::get_json(app.clone(), "/api/v1/streams/order-1").await;
    assert!(json["events"].as_array().unwrap().is_empty());
    let (status, json) = common::post_json(
        app,
        "/api/v1/streams/order-1",
        &json!({ "expected_version": 0, "events": [order_event("OrderCreated")] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["event_numbers"], json!([1]));
}

#[tokio::test]
async fn test_stream_round_trip_in_memory() {
    stream_round_trip(common::build_test_app_with(Arc::new(
        InMemoryStorageEngine::new(),
    )))
    .await;
}

#[sqlx::test(migrations = false)]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_stream_round_trip_on_postgres(pool: PgPool) {
    let engine = PgStorageEngine::builder(pool)
        .options(PgStorageOptions::default().with_page_size(2))
        .initialise()
        .await
        .unwrap();

    stream_round_trip(common::build_test_app_with(Arc::new(engine))).await;
}

#[tokio::test]
async fn test_read_rejects_start_below_one() {
    let app = common::build_test_app();

    let (status, json) = common::get_json(app, "/api/v1/streams/order-1?start=0").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_read_missing_stream_returns_empty_list() {
    let app = common::build_test_app();

    let (status, json) = common::get_json(app, "/api/v1/streams/nobody").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["events"], json!([]));
}

#[tokio::test]
async fn test_from_last_without_match_returns_whole_stream() {
    let app = common::build_test_app();
    common::post_json(
        app.clone(),
        "/api/v1/streams/order-2",
        &json!({
            "expected_version": 0,
            "events": [order_event("OrderCreated"), order_event("OrderDispatched")]
        }),
    )
    .await;

    let (status, json) = common::get_json(
        app,
        "/api/v1/streams/order-2/from-last?body_type=OrderSnapshot",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_empty_append_reports_no_version() {
    let app = common::build_test_app();

    let (status, json) = common::post_json(
        app,
        "/api/v1/streams/order-3",
        &json!({ "expected_version": 5, "events": [] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stream_id"], "order-3");
    assert!(json.get("version").is_none(), "unexpected version in {json}");
    assert_eq!(json["event_numbers"], json!([]));
}
