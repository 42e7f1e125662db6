// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Command identity and lifecycle state machine.
//!
//! A command is one lifecycle instruction carried from the API boundary,
//! through an agent link, to completion. `CommandStatus` only ever moves
//! forward through the partial order in [`CommandStatus::can_transition_to`]
//! — the dispatcher never reopens a terminal command.

use crate::agent::AgentId;
use crate::session::SessionId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a dispatched command.
    pub struct CommandId("cmd-");
}

/// Session-lifecycle instruction a command carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    StartSession,
    StopSession,
    HibernateSession,
    WakeSession,
    VncConnect,
    VncDisconnect,
}

impl CommandType {
    /// `start_session` is the only command that must never be replayed after
    /// reaching a terminal state — every other type is safe to retry because
    /// the agent treats it as idempotent (§4.5).
    pub fn is_idempotent(self) -> bool {
        !matches!(self, CommandType::StartSession)
    }
}

crate::simple_display! {
    CommandType {
        StartSession => "start_session",
        StopSession => "stop_session",
        HibernateSession => "hibernate_session",
        WakeSession => "wake_session",
        VncConnect => "vnc_connect",
        VncDisconnect => "vnc_disconnect",
    }
}

/// Lifecycle state of a dispatched command.
///
/// Linear happy path `pending -> sent -> acked -> completed`, with
/// `failed`/`timeout` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Sent,
    Acked,
    Completed,
    Failed,
    Timeout,
}

crate::simple_display! {
    CommandStatus {
        Pending => "pending",
        Sent => "sent",
        Acked => "acked",
        Completed => "completed",
        Failed => "failed",
        Timeout => "timeout",
    }
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Timeout)
    }

    /// Whether `self -> next` is a legal move in the command state machine.
    ///
    /// Terminal states accept no further transition — exactly one terminal
    /// transition per command (§3 invariant).
    pub fn can_transition_to(self, next: CommandStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (CommandStatus::Pending, CommandStatus::Pending) => true, // retry, same state
            (CommandStatus::Pending, CommandStatus::Sent) => true,
            (CommandStatus::Sent, CommandStatus::Pending) => true, // re-dispatch after no_route
            (CommandStatus::Sent, CommandStatus::Acked) => true,
            (CommandStatus::Acked, CommandStatus::Completed) => true,
            (_, CommandStatus::Failed) | (_, CommandStatus::Timeout) => true,
            (CommandStatus::Sent, CommandStatus::Completed) => true,
            _ => false,
        }
    }
}

/// One lifecycle instruction dispatched to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command_id: CommandId,
    pub agent_id: AgentId,
    pub session_id: SessionId,
    pub command_type: CommandType,
    pub payload: serde_json::Value,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    pub deadline_at_ms: u64,
    /// Number of `no_route`/`agent_offline` retries attempted so far.
    #[serde(default)]
    pub retry_count: u32,
}

impl Command {
    pub fn is_past_deadline(&self, now_ms: u64) -> bool {
        !self.status.is_terminal() && now_ms >= self.deadline_at_ms
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
