//! Crate-wide error types.
//!
//! `BridgeError` is the internal error taxonomy used by the transfer core
//! (Validation, Permission, Transient, RemoteLogical, LocalFilesystem,
//! Cancelled, FatalWorker). `AppError` is the HTTP-facing wrapper that the
//! REST layer converts domain errors into.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Permission(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("remote error: {0}")]
    RemoteLogical(String),

    #[error("local filesystem error: {0}")]
    LocalFilesystem(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("worker failed: {0}")]
    FatalWorker(String),

    #[error("maximum concurrent transfers reached")]
    ConcurrencyLimit,

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("illegal transition: {0} -> {1}")]
    InvalidTransition(String, String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// HTTP-facing error, mapped to a status code and JSON body at the response boundary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            AppError::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

impl From<BridgeError> for AppError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Validation(m) | BridgeError::RemoteLogical(m) => AppError::BadRequest(m),
            BridgeError::Permission(m) => AppError::Forbidden(m),
            BridgeError::NotFound(m) => AppError::NotFound(m),
            BridgeError::ConcurrencyLimit => {
                AppError::BadRequest("maximum concurrent transfers reached".into())
            }
            BridgeError::InvalidTransition(from, to) => {
                AppError::BadRequest(format!("illegal transition: {from} -> {to}"))
            }
            BridgeError::Cancelled => AppError::BadRequest("cancelled".into()),
            other => AppError::Internal(anyhow::anyhow!(other)),
        }
    }
}
