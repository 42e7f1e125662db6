// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! `/auth/login` and `/auth/logout`.
//!
//! User authentication and JWT minting are an external collaborator's
//! responsibility; this replica only fronts the configured bearer token so a
//! caller has something to exchange credentials for. A real deployment sits
//! this behind an identity provider and never reaches these handlers.

use crate::http::ApiErr;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use kh_core::Clock as _;
use kh_wire::http::{LoginRequest, LoginResponse};
use kh_wire::ApiError;
use std::sync::Arc;
use std::time::Duration;

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiErr> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::Unauthenticated.into());
    }
    let now = kh_core::SystemClock.epoch_ms();
    Ok(Json(LoginResponse {
        token: state.config.auth_token.clone(),
        user: req.username,
        expires_at: now + Duration::from_secs(3600).as_millis() as u64,
    }))
}

pub async fn logout() -> axum::http::StatusCode {
    axum::http::StatusCode::OK
}
