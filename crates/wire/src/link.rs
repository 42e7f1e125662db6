// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Agent Link envelope (§4.3): the framed-JSON message set exchanged over
//! the persistent duplex channel between one agent process and one
//! control-plane replica.
//!
//! The two directions are modeled as separate enums rather than one shared
//! envelope — an agent can never legally emit `register_ack` and the hub
//! can never legally emit `register`, so giving each direction its own type
//! makes illegal messages unrepresentable instead of a runtime match arm.

use kh_core::{AgentId, CommandId, CommandType, Platform, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Messages an agent process sends to its owning replica.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AgentMessage {
    /// First message on a new link. Must precede all others.
    Register {
        agent_id: AgentId,
        platform: Platform,
        region: String,
        capacity: RegisterCapacity,
        #[serde(default)]
        metadata: HashMap<String, String>,
    },

    /// Sent every `heartbeat_interval`.
    Heartbeat { agent_id: AgentId, timestamp: u64 },

    /// Immediate reply to a `command` envelope, before execution starts.
    Ack { command_id: CommandId, timestamp: u64 },

    /// Terminal success for a command.
    Complete { command_id: CommandId, result: serde_json::Value, timestamp: u64 },

    /// Terminal failure for a command.
    Fail { command_id: CommandId, error: String, timestamp: u64 },

    /// Unsolicited status push, e.g. draining/follower metadata.
    Status {
        agent_id: AgentId,
        #[serde(default)]
        draining: bool,
        timestamp: u64,
    },

    /// Agent-side port-forward is ready; the proxy may start relaying bytes.
    VncReady { session_id: SessionId, timestamp: u64 },

    /// Agent-side port-forward or tunnel failed.
    VncError { session_id: SessionId, error: String, timestamp: u64 },

    /// Base64-encoded RFB bytes flowing agent → browser.
    VncData { session_id: SessionId, data: String },

    /// Agent tore its half of the tunnel down.
    VncDisconnect { session_id: SessionId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterCapacity {
    pub max_sessions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_millis: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
}

/// Messages a control-plane replica sends to a linked agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum HubMessage {
    /// Reply to `register`; carries the heartbeat cadence the agent must use.
    RegisterAck { heartbeat_interval_secs: u32 },

    /// Dispatch of application work. `deadline_at_ms` lets the agent drop
    /// work it can no longer complete in time, though only the control
    /// plane's reaper is authoritative for timeout.
    Command {
        command_id: CommandId,
        session_id: SessionId,
        command_type: CommandType,
        payload: serde_json::Value,
        deadline_at_ms: u64,
    },

    /// Graceful link teardown, e.g. on replica shutdown.
    Shutdown,

    /// Request the agent open a port-forward to the session's RFB port.
    VncConnect { session_id: SessionId },

    /// Base64-encoded RFB bytes flowing browser → agent.
    VncData { session_id: SessionId, data: String },

    /// Either side closed; tear the tunnel down.
    VncDisconnect { session_id: SessionId },
}

#[cfg(test)]
#[path = "link_tests.rs"]
mod tests;
