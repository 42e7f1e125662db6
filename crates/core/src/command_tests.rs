// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

use super::*;

#[test]
fn happy_path_is_linear() {
    assert!(CommandStatus::Pending.can_transition_to(CommandStatus::Sent));
    assert!(CommandStatus::Sent.can_transition_to(CommandStatus::Acked));
    assert!(CommandStatus::Acked.can_transition_to(CommandStatus::Completed));
}

#[test]
fn failure_branches_reachable_from_any_non_terminal_state() {
    for state in [CommandStatus::Pending, CommandStatus::Sent, CommandStatus::Acked] {
        assert!(state.can_transition_to(CommandStatus::Failed), "{state:?} -> failed");
        assert!(state.can_transition_to(CommandStatus::Timeout), "{state:?} -> timeout");
    }
}

#[test]
fn terminal_states_accept_no_further_transition() {
    for terminal in [CommandStatus::Completed, CommandStatus::Failed, CommandStatus::Timeout] {
        for next in [
            CommandStatus::Pending,
            CommandStatus::Sent,
            CommandStatus::Acked,
            CommandStatus::Completed,
            CommandStatus::Failed,
            CommandStatus::Timeout,
        ] {
            assert!(!terminal.can_transition_to(next), "{terminal:?} -> {next:?} must be rejected");
        }
    }
}

#[test]
fn sent_can_fall_back_to_pending_for_retry() {
    assert!(CommandStatus::Sent.can_transition_to(CommandStatus::Pending));
}

#[test]
fn only_start_session_is_non_idempotent() {
    assert!(!CommandType::StartSession.is_idempotent());
    for t in [
        CommandType::StopSession,
        CommandType::HibernateSession,
        CommandType::WakeSession,
        CommandType::VncConnect,
        CommandType::VncDisconnect,
    ] {
        assert!(t.is_idempotent(), "{t:?} should be idempotent");
    }
}

#[test]
fn past_deadline_only_applies_to_non_terminal_commands() {
    let mut cmd = Command {
        command_id: CommandId::new(),
        agent_id: AgentId::new("a"),
        session_id: SessionId::new("s"),
        command_type: CommandType::StartSession,
        payload: serde_json::Value::Null,
        status: CommandStatus::Pending,
        result: None,
        error: None,
        created_at_ms: 0,
        sent_at_ms: None,
        completed_at_ms: None,
        deadline_at_ms: 1000,
        retry_count: 0,
    };
    assert!(cmd.is_past_deadline(1000));
    assert!(!cmd.is_past_deadline(999));

    cmd.status = CommandStatus::Completed;
    assert!(!cmd.is_past_deadline(5000));
}
