// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! `/agents` — read-mostly view over the Agent Hub's materialized state,
//! plus the one operator write path (`draining`/`online`).

use crate::http::ApiErr;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use kh_core::Clock as _;
use kh_core::{AgentId, AgentStatus, Event, Platform, SystemClock};
use kh_wire::http::{AgentDetail, AgentStats, AgentStatusPatch, AgentStatusTarget, AgentSummary, Page};
use kh_wire::ApiError;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    platform: Option<Platform>,
    status: Option<String>,
    region: Option<String>,
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

fn summarize(agent: &kh_core::Agent) -> AgentSummary {
    AgentSummary {
        agent_id: agent.agent_id.clone(),
        platform: agent.platform,
        region: agent.region.clone(),
        status: agent.status.to_string(),
        sessions_in_use: agent.sessions_in_use,
        max_sessions: agent.capacity.max_sessions,
    }
}

pub async fn list(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> Json<Page<AgentSummary>> {
    let status_filter = q.status.as_deref();
    let mut matched: Vec<AgentSummary> = state.store.read(|s| {
        s.agents
            .values()
            .filter(|a| !a.deleted)
            .filter(|a| q.platform.map_or(true, |p| a.platform == p))
            .filter(|a| q.region.as_deref().map_or(true, |r| a.region == r))
            .filter(|a| status_filter.map_or(true, |st| a.status.to_string() == st))
            .map(summarize)
            .collect()
    });
    matched.sort_by(|a, b| a.agent_id.as_str().cmp(b.agent_id.as_str()));

    let page = q.page.max(1);
    let limit = q.limit.max(1);
    let total = matched.len() as u64;
    let start = ((page - 1) * limit) as usize;
    let items = matched.into_iter().skip(start).take(limit as usize).collect();

    Json(Page { items, page, limit, total })
}

pub async fn detail(State(state): State<Arc<AppState>>, Path(agent_id): Path<String>) -> Result<Json<AgentDetail>, ApiErr> {
    let agent_id = AgentId::new(agent_id);
    let detail = state.store.read(|s| {
        let agent = s.agents.get(&agent_id)?;
        if agent.deleted {
            return None;
        }
        let sessions = s.sessions.values().filter(|sess| sess.agent_id == agent.agent_id).map(|sess| sess.session_id.clone()).collect();
        Some(AgentDetail { summary: summarize(agent), metadata: agent.metadata.clone(), sessions, last_heartbeat_ms: agent.last_heartbeat_ms })
    });
    detail.map(Json).ok_or_else(|| ApiError::NotFound(format!("agent {agent_id}")).into())
}

pub async fn patch_status(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(patch): Json<AgentStatusPatch>,
) -> Result<axum::http::StatusCode, ApiErr> {
    let agent_id = AgentId::new(agent_id);
    let exists = state.store.read(|s| s.agents.get(&agent_id).map(|a| !a.deleted).unwrap_or(false));
    if !exists {
        return Err(ApiError::NotFound(format!("agent {agent_id}")).into());
    }
    let draining = matches!(patch.status, AgentStatusTarget::Draining);
    state
        .store
        .apply(Event::AgentDraining { agent_id, draining, at_ms: SystemClock.epoch_ms() })
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
    Ok(axum::http::StatusCode::OK)
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<AgentStats> {
    let stats = state.store.read(|s| {
        let mut stats = AgentStats { total: 0, online: 0, draining: 0, offline: 0, sessions_in_use: 0, capacity_total: 0 };
        for agent in s.agents.values().filter(|a| !a.deleted) {
            stats.total += 1;
            stats.sessions_in_use += agent.sessions_in_use;
            stats.capacity_total += agent.capacity.max_sessions;
            match agent.status {
                AgentStatus::Online => stats.online += 1,
                AgentStatus::Draining => stats.draining += 1,
                AgentStatus::Offline => stats.offline += 1,
            }
        }
        stats
    });
    Json(stats)
}
