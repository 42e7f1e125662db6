// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Agent identity and registration state.
//!
//! An `AgentId` names one execution-plane process attached to a single
//! platform cluster. It is supplied by the agent on registration (not
//! generated here) and stays stable across reconnects — the hub uses it as
//! the routing key for every command and VNC tunnel.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

/// Unique, stable identifier for an execution-plane agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for AgentId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AgentId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for AgentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Execution platform an agent drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Kubernetes,
    Docker,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Kubernetes => write!(f, "kubernetes"),
            Platform::Docker => write!(f, "docker"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kubernetes" => Ok(Platform::Kubernetes),
            "docker" => Ok(Platform::Docker),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Liveness/admission state of an agent, as seen by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Linked, leader, accepting dispatch.
    Online,
    /// Linked but an operator asked it to stop taking new sessions.
    Draining,
    /// No live link and the routing TTL has lapsed.
    Offline,
}

crate::simple_display! {
    AgentStatus {
        Online => "online",
        Draining => "draining",
        Offline => "offline",
    }
}

/// Declared resource budget for an agent's cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub max_sessions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_millis: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
}

/// Identity record for one execution cluster.
///
/// Created on first successful registration; mutated only by the replica
/// currently holding the link (status + heartbeat) or by an operator
/// (draining). Never hard-deleted, so audit history survives agent churn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub platform: Platform,
    pub region: String,
    pub capacity: Capacity,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub status: AgentStatus,
    /// Epoch milliseconds of the last heartbeat observed for this agent.
    pub last_heartbeat_ms: u64,
    pub sessions_in_use: u32,
    /// Soft-delete marker; the row is retained for audit once set.
    #[serde(default)]
    pub deleted: bool,
}

impl Agent {
    pub fn has_capacity(&self) -> bool {
        !self.deleted
            && self.status == AgentStatus::Online
            && self.sessions_in_use < self.capacity.max_sessions
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
