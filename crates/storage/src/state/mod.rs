// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Materialized state built from WAL replay.

mod agents;
mod commands;
mod helpers;
mod sessions;
mod tunnels;

use kh_core::{Agent, AgentId, Command, CommandId, Event, SessionId, SessionRef, TunnelId, TunnelRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Event-sourced projection of agents, commands, sessions, and tunnels.
///
/// Rebuilt by replaying the WAL from the most recent [`crate::Snapshot`].
/// Every `apply_*` handler must be idempotent — the same event may be
/// applied once for immediate visibility and again during replay.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub agents: HashMap<AgentId, Agent>,
    pub commands: HashMap<CommandId, Command>,
    pub sessions: HashMap<SessionId, SessionRef>,
    pub tunnels: HashMap<TunnelId, TunnelRecord>,
}

impl MaterializedState {
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::AgentRegistered { .. }
            | Event::AgentHeartbeat { .. }
            | Event::AgentDisconnected { .. }
            | Event::AgentDraining { .. }
            | Event::AgentDeleted { .. } => agents::apply(self, event),

            Event::CommandCreated { .. }
            | Event::CommandStatusChanged { .. }
            | Event::CommandRetryScheduled { .. } => commands::apply(self, event),

            Event::SessionRegistered { .. } | Event::SessionStateChanged { .. } => {
                sessions::apply(self, event)
            }

            Event::TunnelOpened { .. } | Event::TunnelClosed { .. } => tunnels::apply(self, event),
        }
    }

    pub fn agents_online(&self, platform: Option<kh_core::Platform>, region: Option<&str>) -> Vec<&Agent> {
        self.agents
            .values()
            .filter(|a| !a.deleted && a.status == kh_core::AgentStatus::Online)
            .filter(|a| platform.map_or(true, |p| a.platform == p))
            .filter(|a| region.map_or(true, |r| a.region == r))
            .collect()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
