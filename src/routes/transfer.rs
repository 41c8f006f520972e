//! Transfer lifecycle surface: create, list, start, pause, resume, cancel,
//! restart, and status for a transfer task.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::require_session;
use crate::error::AppError;
use crate::state::AppState;
use crate::transfer::{TaskId, TransferDirection, TransferTask};

pub fn item_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create", post(create))
        .route("/{id}/start", post(start))
        .route("/{id}/pause", post(pause))
        .route("/{id}/resume", post(resume))
        .route("/{id}/cancel", post(cancel))
        .route("/{id}/restart", post(restart))
        .route("/{id}", get(get_one).delete(remove))
        .route("/{id}/status", get(status))
}

pub fn collection_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    src_path: String,
    dest_path: String,
    transfer_type: TransferTypeWire,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum TransferTypeWire {
    Webdav,
    Disk,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    task_id: TaskId,
}

fn session_header(headers: &axum::http::HeaderMap) -> Option<String> {
    super::session_id_from_headers(headers)
}

async fn create(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<CreateBody>,
) -> Result<Json<CreateResponse>, AppError> {
    let session = require_session(&state.sessions, session_header(&headers).as_deref())?;
    let direction = match body.transfer_type {
        TransferTypeWire::Webdav => TransferDirection::Transfer,
        TransferTypeWire::Disk => TransferDirection::Download,
    };
    let task_id = session.manager.create(session.id.clone(), body.src_path, body.dest_path, direction);
    Ok(Json(CreateResponse { task_id }))
}

async fn start(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, AppError> {
    let session = require_session(&state.sessions, session_header(&headers).as_deref())?;
    session.manager.start(id).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn pause(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, AppError> {
    let session = require_session(&state.sessions, session_header(&headers).as_deref())?;
    session.manager.pause(id)?;
    Ok(axum::http::StatusCode::OK)
}

async fn resume(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, AppError> {
    let session = require_session(&state.sessions, session_header(&headers).as_deref())?;
    session.manager.resume(id).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, AppError> {
    let session = require_session(&state.sessions, session_header(&headers).as_deref())?;
    session.manager.cancel(id).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn restart(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, AppError> {
    let session = require_session(&state.sessions, session_header(&headers).as_deref())?;
    session.manager.restart(id).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn get_one(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TransferTask>, AppError> {
    let session = require_session(&state.sessions, session_header(&headers).as_deref())?;
    session.manager.get(id).map(Json).ok_or_else(|| AppError::NotFound(id.to_string()))
}

/// Has an autogc side effect: schedules removal of a terminal task
/// ~100ms after this response is sent, never before.
async fn status(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TransferTask>, AppError> {
    let session = require_session(&state.sessions, session_header(&headers).as_deref())?;
    let task = session.manager.get(id).ok_or_else(|| AppError::NotFound(id.to_string()))?;
    if task.status.is_terminal() {
        session.manager.schedule_autogc(id);
    }
    Ok(Json(task))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, AppError> {
    let session = require_session(&state.sessions, session_header(&headers).as_deref())?;
    session.manager.remove(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn list(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<Vec<TransferTask>>, AppError> {
    let session = require_session(&state.sessions, session_header(&headers).as_deref())?;
    Ok(Json(session.manager.get_by_session(&session.id)))
}
