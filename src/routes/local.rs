//! Local filesystem browser: list, stat, and navigate directories on the
//! machine running the bridge, for picking an upload source or download
//! destination.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::require_session;
use crate::error::{AppError, BridgeError};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/list", get(list))
        .route("/pwd", get(pwd))
        .route("/stat", get(stat))
        .route("/cd", post(cd))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocalEntry {
    name: String,
    size: u64,
    is_dir: bool,
}

#[derive(Deserialize)]
struct PathQuery {
    path: String,
}

async fn list(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(q): Query<PathQuery>,
) -> Result<Json<Vec<LocalEntry>>, AppError> {
    require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    let dir = PathBuf::from(&q.path);
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(&dir).await.map_err(BridgeError::LocalFilesystem)?;
    while let Some(entry) = read_dir.next_entry().await.map_err(BridgeError::LocalFilesystem)? {
        let meta = entry.metadata().await.map_err(BridgeError::LocalFilesystem)?;
        entries.push(LocalEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            size: meta.len(),
            is_dir: meta.is_dir(),
        });
    }
    Ok(Json(entries))
}

async fn pwd(State(state): State<Arc<AppState>>, headers: axum::http::HeaderMap) -> Result<Json<serde_json::Value>, AppError> {
    require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    let cwd = std::env::current_dir().map_err(BridgeError::LocalFilesystem)?;
    Ok(Json(serde_json::json!({ "path": cwd.to_string_lossy() })))
}

async fn stat(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(q): Query<PathQuery>,
) -> Result<Json<LocalEntry>, AppError> {
    require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    let path = PathBuf::from(&q.path);
    let meta = tokio::fs::metadata(&path).await.map_err(BridgeError::LocalFilesystem)?;
    Ok(Json(LocalEntry {
        name: path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
        size: meta.len(),
        is_dir: meta.is_dir(),
    }))
}

#[derive(Deserialize)]
struct CdBody {
    path: String,
}

async fn cd(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<CdBody>,
) -> Result<axum::http::StatusCode, AppError> {
    require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    let meta = tokio::fs::metadata(&body.path).await.map_err(BridgeError::LocalFilesystem)?;
    if !meta.is_dir() {
        return Err(AppError::BadRequest(format!("{} is not a directory", body.path)));
    }
    Ok(axum::http::StatusCode::OK)
}
