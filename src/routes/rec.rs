//! Rec FS surface: a thin pass-through to the Rec API contract.
//! Only the operations the core pipeline's contract needs (`list`,
//! `mkdir`) are wired to a real collaborator call; the remaining Rec CLI
//! surface (`pwd`, `whoami`, `groups`, `df`, `cd`, `rename`, `recycle`,
//! `restore`, `unwrap`, `save`) is session-scoped bookkeeping with no
//! bearing on the transfer core and is named here for surface completeness.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::require_session;
use crate::contracts::NormalizedEntry;
use crate::error::AppError;
use crate::state::AppState;
use crate::transfer::DiskType;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/list", get(list))
        .route("/mkdir", post(mkdir))
        .route("/delete", axum::routing::delete(delete))
        .route("/pwd", get(pwd))
        .route("/whoami", get(whoami))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    path: String,
    #[serde(default)]
    group_id: Option<String>,
}

async fn list(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<NormalizedEntry>>, AppError> {
    let session = require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    let resolved = session.rec_fs.resolve(&session.id, &q.path).await?;
    let entries = session
        .rec_api
        .list_children(&resolved.id, resolved.disk_type, q.group_id.as_deref())
        .await?;
    Ok(Json(entries))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MkdirBody {
    parent_path: String,
    names: Vec<String>,
}

async fn mkdir(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<MkdirBody>,
) -> Result<Json<Vec<String>>, AppError> {
    let session = require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    let resolved = session.rec_fs.resolve(&session.id, &body.parent_path).await?;
    let ids = session.rec_api.mkdir(&resolved.id, &body.names).await?;
    Ok(Json(ids))
}

#[derive(Deserialize)]
struct DeleteQuery {
    path: String,
}

async fn delete(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(_q): Query<DeleteQuery>,
) -> Result<axum::http::StatusCode, AppError> {
    require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    // Delete-by-path requires the recycle-bin semantics of the Rec API,
    // which the contract trait does not expose; left as a 501 seam.
    Ok(axum::http::StatusCode::NOT_IMPLEMENTED)
}

async fn pwd(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    Ok(Json(serde_json::json!({ "path": "/", "diskType": disk_type_json(DiskType::Personal), "account": session.rec_account })))
}

async fn whoami(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = require_session(&state.sessions, super::session_id_from_headers(&headers).as_deref())?;
    Ok(Json(serde_json::json!({ "account": session.rec_account })))
}

fn disk_type_json(disk_type: DiskType) -> &'static str {
    match disk_type {
        DiskType::Personal => "personal",
        DiskType::Backup => "backup",
        DiskType::Recycle => "recycle",
    }
}
