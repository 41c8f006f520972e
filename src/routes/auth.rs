use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::{self, LoginResponse};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/login", post(login)).route("/logout", post(logout))
}

#[derive(Deserialize)]
struct LoginBody {
    rec_account: String,
    rec_password: String,
    #[serde(default)]
    pan_dav_account: Option<String>,
    #[serde(default)]
    pan_dav_password: Option<String>,
}

async fn login(State(state): State<Arc<AppState>>, Json(body): Json<LoginBody>) -> Result<Json<LoginResponse>, AppError> {
    let req = auth::LoginRequest {
        rec_account: body.rec_account,
        rec_password: body.rec_password,
        pan_dav_account: body.pan_dav_account,
        pan_dav_password: body.pan_dav_password,
    };
    let resp = auth::login(&state.sessions, &state.config, req).await?;
    Ok(Json(resp))
}

async fn logout(State(state): State<Arc<AppState>>, headers: axum::http::HeaderMap) -> axum::http::StatusCode {
    if let Some(id) = super::session_id_from_headers(&headers) {
        auth::logout(&state.sessions, &id);
    }
    axum::http::StatusCode::OK
}
