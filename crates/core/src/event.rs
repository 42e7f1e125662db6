// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Event types applied to `MaterializedState` during normal operation and
//! WAL replay.
//!
//! Serializes with `{"type": "agent:registered", ...fields}` shape so a
//! snapshot+WAL pair deserializes unambiguously across versions.

use crate::agent::{AgentId, Capacity, Platform};
use crate::command::{CommandId, CommandStatus, CommandType};
use crate::session::SessionId;
use crate::tunnel::TunnelId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "agent:registered")]
    AgentRegistered {
        agent_id: AgentId,
        platform: Platform,
        region: String,
        capacity: Capacity,
        metadata: HashMap<String, String>,
        replica_id: String,
        at_ms: u64,
    },

    #[serde(rename = "agent:heartbeat")]
    AgentHeartbeat { agent_id: AgentId, replica_id: String, at_ms: u64 },

    #[serde(rename = "agent:disconnected")]
    AgentDisconnected { agent_id: AgentId, replica_id: String, at_ms: u64 },

    #[serde(rename = "agent:draining")]
    AgentDraining { agent_id: AgentId, draining: bool, at_ms: u64 },

    #[serde(rename = "agent:deleted")]
    AgentDeleted { agent_id: AgentId, at_ms: u64 },

    #[serde(rename = "command:created")]
    CommandCreated {
        command_id: CommandId,
        agent_id: AgentId,
        session_id: SessionId,
        command_type: CommandType,
        payload: serde_json::Value,
        deadline_at_ms: u64,
        at_ms: u64,
    },

    #[serde(rename = "command:status")]
    CommandStatusChanged {
        command_id: CommandId,
        status: CommandStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        at_ms: u64,
    },

    #[serde(rename = "command:retry")]
    CommandRetryScheduled { command_id: CommandId, retry_count: u32, at_ms: u64 },

    #[serde(rename = "session:registered")]
    SessionRegistered {
        session_id: SessionId,
        agent_id: AgentId,
        platform: Platform,
        owner_user_id: String,
        at_ms: u64,
    },

    #[serde(rename = "session:state")]
    SessionStateChanged { session_id: SessionId, state: crate::session::SessionState, at_ms: u64 },

    #[serde(rename = "tunnel:opened")]
    TunnelOpened { tunnel_id: TunnelId, session_id: SessionId, agent_id: AgentId, at_ms: u64 },

    #[serde(rename = "tunnel:closed")]
    TunnelClosed { tunnel_id: TunnelId, session_id: SessionId, at_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_round_trips() {
        let ev = Event::AgentHeartbeat {
            agent_id: AgentId::new("k8s-a"),
            replica_id: "r1".into(),
            at_ms: 42,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"agent:heartbeat\""));
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ev);
    }
}
