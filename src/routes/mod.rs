//! REST surface, laid out one router per resource.

pub mod auth;
pub mod health;
pub mod local;
pub mod pandav;
pub mod rec;
pub mod transfer;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/", health::router())
        .nest("/", auth::router())
        .nest("/transfer", transfer::item_router())
        .nest("/transfers", transfer::collection_router())
        .nest("/rec", rec::router())
        .nest("/pandav", pandav::router())
        .nest("/local", local::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Extract the session for a request from the `X-Session-ID` header.
pub fn session_id_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    headers.get("X-Session-ID").and_then(|v| v.to_str().ok()).map(str::to_string)
}
