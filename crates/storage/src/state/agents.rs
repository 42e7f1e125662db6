// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Agent lifecycle event handlers.

use kh_core::{Agent, AgentStatus, Event};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::AgentRegistered { agent_id, platform, region, capacity, metadata, at_ms, .. } => {
            match state.agents.get_mut(agent_id) {
                Some(rec) => {
                    rec.platform = *platform;
                    rec.region = region.clone();
                    rec.capacity = *capacity;
                    rec.metadata = metadata.clone();
                    rec.status = AgentStatus::Online;
                    rec.last_heartbeat_ms = *at_ms;
                    rec.deleted = false;
                }
                None => {
                    state.agents.insert(
                        agent_id.clone(),
                        Agent {
                            agent_id: agent_id.clone(),
                            platform: *platform,
                            region: region.clone(),
                            capacity: *capacity,
                            metadata: metadata.clone(),
                            status: AgentStatus::Online,
                            last_heartbeat_ms: *at_ms,
                            sessions_in_use: 0,
                            deleted: false,
                        },
                    );
                }
            }
        }

        Event::AgentHeartbeat { agent_id, at_ms, .. } => {
            if let Some(rec) = state.agents.get_mut(agent_id) {
                rec.last_heartbeat_ms = *at_ms;
            }
        }

        Event::AgentDisconnected { agent_id, .. } => {
            if let Some(rec) = state.agents.get_mut(agent_id) {
                rec.status = AgentStatus::Offline;
            }
        }

        Event::AgentDraining { agent_id, draining, .. } => {
            if let Some(rec) = state.agents.get_mut(agent_id) {
                if rec.status != AgentStatus::Offline {
                    rec.status = if *draining { AgentStatus::Draining } else { AgentStatus::Online };
                }
            }
        }

        Event::AgentDeleted { agent_id, .. } => {
            if let Some(rec) = state.agents.get_mut(agent_id) {
                rec.deleted = true;
                rec.status = AgentStatus::Offline;
            }
        }

        _ => {}
    }
}
