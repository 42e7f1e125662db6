// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! `/sessions` — the API boundary's entry point into the Command Dispatcher
//! (§2 flow: "API boundary -> C5 enqueues command"). Session rows themselves
//! are owned by an external persistence collaborator (§3); this replica only
//! keeps the `SessionRef` projection it needs to route commands and tunnels.

use crate::http::ApiErr;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use kh_core::{Clock as _, CommandType, Event, SessionId, SessionState, SystemClock};
use kh_wire::http::{
    CreateSessionRequest, DeleteSessionQuery, Page, SessionDetail, SessionLogs, SessionLogsQuery,
    SessionStatePatch, SessionSummary,
};
use kh_wire::ApiError;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    state: Option<SessionState>,
    owner_user_id: Option<String>,
    agent_id: Option<String>,
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

fn summarize(session: &kh_core::SessionRef) -> SessionSummary {
    SessionSummary {
        session_id: session.session_id.clone(),
        agent_id: session.agent_id.clone(),
        platform: session.platform,
        state: session.state,
        owner_user_id: session.owner_user_id.clone(),
    }
}

fn vnc_address(session: &kh_core::SessionRef) -> Option<String> {
    (session.state == SessionState::Running).then(|| format!("/vnc-viewer/{}", session.session_id))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(axum::http::StatusCode, Json<SessionDetail>), ApiErr> {
    if req.template.is_empty() || req.owner_user_id.is_empty() {
        return Err(ApiError::InvalidInput("template and owner_user_id are required".into()).into());
    }

    let candidates = state.hub.list_online(req.platform, req.region.as_deref());
    let chosen = candidates.into_iter().find(|a| a.has_capacity());
    let Some(agent) = chosen else {
        return Err(ApiError::NoCapacity("no agent with free capacity for the requested platform/region".into()).into());
    };

    let session_id = SessionId::new(format!("sess-{}", nanoid::nanoid!(16)));
    let now = SystemClock.epoch_ms();
    state
        .store
        .apply(Event::SessionRegistered {
            session_id: session_id.clone(),
            agent_id: agent.agent_id.clone(),
            platform: agent.platform,
            owner_user_id: req.owner_user_id.clone(),
            at_ms: now,
        })
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let payload = serde_json::json!({ "template": req.template, "metadata": req.metadata });
    state
        .dispatcher
        .enqueue(agent.agent_id.clone(), session_id.clone(), CommandType::StartSession, payload, None)
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let session = state.store.read(|s| s.sessions.get(&session_id).cloned()).expect("just registered");
    Ok((axum::http::StatusCode::ACCEPTED, Json(SessionDetail { summary: summarize(&session), vnc_address: vnc_address(&session) })))
}

pub async fn list(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> Json<Page<SessionSummary>> {
    let mut matched: Vec<SessionSummary> = state.store.read(|s| {
        s.sessions
            .values()
            .filter(|sess| q.state.map_or(true, |st| sess.state == st))
            .filter(|sess| q.owner_user_id.as_deref().map_or(true, |o| sess.owner_user_id == o))
            .filter(|sess| q.agent_id.as_deref().map_or(true, |a| sess.agent_id == *a))
            .map(summarize)
            .collect()
    });
    matched.sort_by(|a, b| a.session_id.as_str().cmp(b.session_id.as_str()));

    let page = q.page.max(1);
    let limit = q.limit.max(1);
    let total = matched.len() as u64;
    let start = ((page - 1) * limit) as usize;
    let items = matched.into_iter().skip(start).take(limit as usize).collect();

    Json(Page { items, page, limit, total })
}

pub async fn detail(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> Result<Json<SessionDetail>, ApiErr> {
    let session_id = SessionId::new(session_id);
    let session = state.store.read(|s| s.sessions.get(&session_id).cloned());
    session
        .map(|s| Json(SessionDetail { vnc_address: vnc_address(&s), summary: summarize(&s) }))
        .ok_or_else(|| ApiError::NotFound(format!("session {session_id}")).into())
}

pub async fn patch_state(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(patch): Json<SessionStatePatch>,
) -> Result<axum::http::StatusCode, ApiErr> {
    let session_id = SessionId::new(session_id);
    let session = state
        .store
        .read(|s| s.sessions.get(&session_id).cloned())
        .ok_or_else(|| ApiError::NotFound(format!("session {session_id}")))?;

    if !session.state.can_patch_to(patch.state) {
        return Err(ApiError::InvalidTransition(format!("{} -> {}", session.state, patch.state)).into());
    }

    let command_type = match patch.state {
        SessionState::Hibernated => CommandType::HibernateSession,
        SessionState::Running => CommandType::WakeSession,
        SessionState::Terminating => CommandType::StopSession,
        _ => unreachable!("can_patch_to only allows hibernated/running/terminating targets"),
    };

    if patch.state == SessionState::Terminating {
        state
            .store
            .apply(Event::SessionStateChanged { session_id: session_id.clone(), state: SessionState::Terminating, at_ms: SystemClock.epoch_ms() })
            .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
    }

    state
        .dispatcher
        .enqueue(session.agent_id.clone(), session_id, command_type, serde_json::json!({}), None)
        .await
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    Ok(axum::http::StatusCode::OK)
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(q): Query<DeleteSessionQuery>,
) -> Result<axum::http::StatusCode, ApiErr> {
    let session_id = SessionId::new(session_id);
    let session = state
        .store
        .read(|s| s.sessions.get(&session_id).cloned())
        .ok_or_else(|| ApiError::NotFound(format!("session {session_id}")))?;

    let now = SystemClock.epoch_ms();
    if q.force {
        state
            .store
            .apply(Event::SessionStateChanged { session_id: session_id.clone(), state: SessionState::Terminated, at_ms: now })
            .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
    } else {
        state
            .store
            .apply(Event::SessionStateChanged { session_id: session_id.clone(), state: SessionState::Terminating, at_ms: now })
            .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        state
            .dispatcher
            .enqueue(session.agent_id.clone(), session_id, CommandType::StopSession, serde_json::json!({}), None)
            .await
            .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
    }

    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Log retrieval goes through the platform SDK the agent drives, which is an
/// external collaborator (§1 scope); this surfaces whatever the session
/// projection knows without a wire round-trip to the agent.
pub async fn logs(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(_q): Query<SessionLogsQuery>,
) -> Result<Json<SessionLogs>, ApiErr> {
    let session_id = SessionId::new(session_id);
    let exists = state.store.read(|s| s.sessions.contains_key(&session_id));
    if !exists {
        return Err(ApiError::NotFound(format!("session {session_id}")).into());
    }
    Ok(Json(SessionLogs { session_id, lines: Vec::new() }))
}
