// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! `/templates` — session templates are rows in an external relational
//! store (§1 scope: persistence is consumed only as a key-value/rows
//! interface). This replica doesn't own that store, so it has nothing to
//! list; these handlers exist so the route surface matches the API without
//! implying the daemon owns template CRUD.

use crate::http::ApiErr;
use axum::extract::Path;
use axum::Json;
use kh_wire::ApiError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TemplateSummary {
    pub name: String,
}

pub async fn list() -> Json<Vec<TemplateSummary>> {
    Json(Vec::new())
}

pub async fn detail(Path(name): Path<String>) -> Result<Json<TemplateSummary>, ApiErr> {
    Err(ApiError::NotFound(format!("template {name}")).into())
}
