//! Stream routes: append, read, read from last and delete.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use tessera_core::error::EventStoreError;
use tessera_core::event::{EventData, Payload, StorageEvent};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// One event in an append request.
#[derive(Debug, Deserialize)]
pub struct NewEvent {
    /// Event id; a time-ordered id is generated when omitted.
    #[serde(default)]
    pub event_id: Option<Uuid>,
    /// Body discriminator.
    pub body_type: String,
    /// Body payload.
    pub body: serde_json::Value,
    /// Metadata discriminator. Required together with `metadata`.
    #[serde(default)]
    pub metadata_type: Option<String>,
    /// Metadata payload.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl TryFrom<NewEvent> for EventData {
    type Error = EventStoreError;

    fn try_from(event: NewEvent) -> Result<Self, Self::Error> {
        let data = EventData::new(
            event.event_id.unwrap_or_else(Uuid::now_v7),
            Payload::named(event.body_type, event.body),
        );
        match (event.metadata_type, event.metadata) {
            (Some(metadata_type), Some(metadata)) => {
                Ok(data.with_metadata(Payload::named(metadata_type, metadata)))
            }
            (None, None) => Ok(data),
            _ => Err(EventStoreError::Validation(
                "metadata and metadata_type must be given together".into(),
            )),
        }
    }
}

/// Request body for POST /{stream_id}.
#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    /// Version the stream must be at for the append to succeed.
    pub expected_version: i64,
    /// Events to append, in order.
    pub events: Vec<NewEvent>,
}

/// Response body returned after a successful append.
#[derive(Debug, Serialize)]
pub struct AppendResponse {
    /// Stream the events were appended to.
    pub stream_id: String,
    /// Stream version after the append. Omitted when no events were
    /// written, since an empty append does not check the stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Numbers assigned to the appended events.
    pub event_numbers: Vec<i64>,
}

/// Query of GET /{stream_id}.
#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    /// First event number to return. Defaults to 1.
    pub start: Option<i64>,
    /// Maximum number of events to return. Defaults to all.
    pub count: Option<i64>,
}

/// Query of GET /{stream_id}/from-last.
#[derive(Debug, Deserialize)]
pub struct FromLastQuery {
    /// Discriminator of the event to read from.
    pub body_type: String,
}

/// Events of one stream.
#[derive(Debug, Serialize)]
pub struct StreamResponse {
    /// Stream that was read.
    pub stream_id: String,
    /// Events read, in ascending event-number order.
    pub events: Vec<StorageEvent>,
}

/// POST /{stream_id}
#[instrument(skip(state, request), fields(event_count = request.events.len()))]
async fn append_to_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Json(request): Json<AppendRequest>,
) -> Result<Json<AppendResponse>, ApiError> {
    let events = request
        .events
        .into_iter()
        .map(EventData::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let persisted = state
        .store
        .append_to_stream(&stream_id, request.expected_version, events)
        .await?;

    let event_numbers: Vec<i64> = persisted.iter().map(|e| e.event_number).collect();
    let version = event_numbers.last().copied();
    info!(?version, "events appended");

    Ok(Json(AppendResponse {
        stream_id,
        version,
        event_numbers,
    }))
}

/// GET /{stream_id}
#[instrument(skip(state))]
async fn read_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<StreamResponse>, ApiError> {
    let events = state
        .store
        .read_stream_forwards_range(
            &stream_id,
            query.start.unwrap_or(1),
            query.count.unwrap_or(i64::MAX),
        )
        .await?;

    Ok(Json(StreamResponse { stream_id, events }))
}

/// GET /{stream_id}/from-last
#[instrument(skip(state))]
async fn read_stream_from_last(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Query(query): Query<FromLastQuery>,
) -> Result<Json<StreamResponse>, ApiError> {
    let events = state
        .store
        .read_stream_forwards_from_last(&stream_id, |event| event.body_type == query.body_type)
        .await?;

    Ok(Json(StreamResponse { stream_id, events }))
}

/// DELETE /{stream_id}
#[instrument(skip(state))]
async fn delete_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_stream(&stream_id).await?;
    info!("stream deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Returns the router for stream operations.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{stream_id}",
            get(read_stream).post(append_to_stream).delete(delete_stream),
        )
        .route("/{stream_id}/from-last", get(read_stream_from_last))
}
