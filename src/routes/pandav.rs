//! PanDav FS surface: parallel to `/rec/*`, returns 403 when WebDAV
//! credentials are absent from the session.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::require_session;
use crate::contracts::NormalizedEntry;
use crate::error::{AppError, BridgeError};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/list", get(list)).route("/mkdir", post(mkdir))
}

#[derive(Deserialize)]
struct ListQuery {
    path: String,
}

async fn list(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<NormalizedEntry>>, AppError> {
    let session = require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    require_webdav(session.has_webdav)?;
    let entry = session.webdav.stat(&q.path).await?;
    Ok(Json(vec![entry]))
}

#[derive(Deserialize)]
struct MkdirBody {
    path: String,
}

async fn mkdir(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<MkdirBody>,
) -> Result<axum::http::StatusCode, AppError> {
    let session = require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    require_webdav(session.has_webdav)?;
    session.webdav.mkdir(&body.path).await?;
    Ok(axum::http::StatusCode::CREATED)
}

fn require_webdav(has_webdav: bool) -> Result<(), BridgeError> {
    if has_webdav {
        Ok(())
    } else {
        Err(BridgeError::Permission("WebDAV credentials not configured".into()))
    }
}
