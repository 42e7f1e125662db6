// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Session identity and lifecycle state.
//!
//! A session is owned by the external persistence collaborator; the core
//! only references its identity and reads/writes the fields it needs to
//! route commands and VNC tunnels (`agent_id`, `platform`, `state`).

use crate::agent::{AgentId, Platform};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a user-owned session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for SessionId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SessionId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a session, as tracked by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Running,
    Hibernated,
    Terminating,
    Terminated,
    Failed,
}

crate::simple_display! {
    SessionState {
        Pending => "pending",
        Running => "running",
        Hibernated => "hibernated",
        Terminating => "terminating",
        Terminated => "terminated",
        Failed => "failed",
    }
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Terminated | SessionState::Failed)
    }

    /// User-requested transitions allowed via `PATCH /sessions/{id}`.
    ///
    /// `running<->hibernated`, `running|hibernated->terminating` are the only
    /// operator-visible moves; `pending`, `terminated`, and `failed` are
    /// reached only by the dispatcher reacting to command outcomes.
    pub fn can_patch_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Running, SessionState::Hibernated)
                | (SessionState::Hibernated, SessionState::Running)
                | (SessionState::Running, SessionState::Terminating)
                | (SessionState::Hibernated, SessionState::Terminating)
        )
    }
}

/// Minimal session projection the dispatcher and VNC proxy need.
///
/// The authoritative session record lives in the external persistence
/// collaborator (§3); this is the subset the core reads/writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRef {
    pub session_id: SessionId,
    pub agent_id: AgentId,
    pub platform: Platform,
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnc_address: Option<String>,
    pub owner_user_id: String,
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
