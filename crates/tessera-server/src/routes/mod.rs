//! HTTP routes.

use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod streams;

/// Returns the full application router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/streams", streams::router())
}
