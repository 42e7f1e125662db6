// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Caller-facing HTTP API (§6.1), versioned under `/api/v1`. Every route but
//! `/auth/login` requires a bearer token matching `config.auth_token`.

mod agents;
mod auth;
mod sessions;
mod templates;
mod users;
pub mod vnc_ws;

use crate::AppState;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use kh_core::Clock as _;
use kh_wire::http::ErrorEnvelope;
use kh_wire::ApiError;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router<()> {
    let authenticated = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/agents", get(agents::list))
        .route("/agents/stats", get(agents::stats))
        .route("/agents/{agent_id}", get(agents::detail).patch(agents::patch_status))
        .route("/sessions", get(sessions::list).post(sessions::create))
        .route("/sessions/{session_id}", get(sessions::detail).patch(sessions::patch_state).delete(sessions::delete))
        .route("/sessions/{session_id}/logs", get(sessions::logs))
        .route("/templates", get(templates::list))
        .route("/templates/{name}", get(templates::detail))
        .route("/users", get(users::list).post(users::create))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_bearer_token));

    Router::new().route("/auth/login", post(auth::login)).merge(authenticated).with_state(state)
}

async fn require_bearer_token(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(t) if !state.config.auth_token.is_empty() && t == state.config.auth_token => next.run(request).await,
        _ => respond(ApiError::Unauthenticated),
    }
}

/// Renders an [`ApiError`] as the `{error, message, code, details?, timestamp,
/// request_id}` envelope (§6.1), with the status code §7 assigns it.
pub fn respond(err: ApiError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorEnvelope {
        error: err.error_tag().to_string(),
        message: err.to_string(),
        code: err.status_code(),
        details: None,
        timestamp: kh_core::SystemClock.epoch_ms(),
        request_id: nanoid::nanoid!(12),
    };
    (status, Json(body)).into_response()
}

pub struct ApiErr(pub ApiError);

impl From<ApiError> for ApiErr {
    fn from(e: ApiError) -> Self {
        ApiErr(e)
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        respond(self.0)
    }
}
