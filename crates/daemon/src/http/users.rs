// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! `/users` — like `/templates`, user records live in an external store
//! this replica only consumes by id (§1). `create` hands back an opaque id
//! rather than persisting anything, so callers exercising the route surface
//! in front of a not-yet-wired identity provider get a stable response shape.

use axum::Json;
use kh_core::Clock as _;
use kh_core::SystemClock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub user_id: String,
    pub username: String,
    pub created_at_ms: u64,
}

pub async fn list() -> Json<Vec<UserSummary>> {
    Json(Vec::new())
}

pub async fn create(Json(req): Json<CreateUserRequest>) -> (axum::http::StatusCode, Json<UserSummary>) {
    let summary = UserSummary {
        user_id: format!("user-{}", nanoid::nanoid!(12)),
        username: req.username,
        created_at_ms: SystemClock.epoch_ms(),
    };
    (axum::http::StatusCode::CREATED, Json(summary))
}
