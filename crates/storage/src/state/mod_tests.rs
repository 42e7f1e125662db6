// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

use super::*;
use kh_core::{Capacity, CommandStatus, CommandType, Platform, SessionState};

fn register_agent(state: &mut MaterializedState, agent_id: &str, max_sessions: u32) {
    state.apply_event(&Event::AgentRegistered {
        agent_id: AgentId::new(agent_id),
        platform: Platform::Kubernetes,
        region: "us-east-1".into(),
        capacity: Capacity { max_sessions, cpu_millis: None, memory_mb: None },
        metadata: HashMap::new(),
        replica_id: "r1".into(),
        at_ms: 0,
    });
}

#[test]
fn agent_registered_twice_updates_rather_than_duplicates() {
    let mut state = MaterializedState::default();
    register_agent(&mut state, "a1", 4);
    register_agent(&mut state, "a1", 8);
    assert_eq!(state.agents.len(), 1);
    assert_eq!(state.agents[&AgentId::new("a1")].capacity.max_sessions, 8);
}

#[test]
fn disconnect_marks_offline_without_removing_the_record() {
    let mut state = MaterializedState::default();
    register_agent(&mut state, "a1", 4);
    state.apply_event(&Event::AgentDisconnected { agent_id: AgentId::new("a1"), replica_id: "r1".into(), at_ms: 1 });
    assert_eq!(state.agents[&AgentId::new("a1")].status, kh_core::AgentStatus::Offline);
    assert_eq!(state.agents.len(), 1);
}

#[test]
fn draining_does_not_override_offline() {
    let mut state = MaterializedState::default();
    register_agent(&mut state, "a1", 4);
    state.apply_event(&Event::AgentDisconnected { agent_id: AgentId::new("a1"), replica_id: "r1".into(), at_ms: 1 });
    state.apply_event(&Event::AgentDraining { agent_id: AgentId::new("a1"), draining: false, at_ms: 2 });
    assert_eq!(state.agents[&AgentId::new("a1")].status, kh_core::AgentStatus::Offline);
}

#[test]
fn start_session_completion_increments_sessions_in_use() {
    let mut state = MaterializedState::default();
    register_agent(&mut state, "a1", 4);
    let command_id = CommandId::new();
    state.apply_event(&Event::CommandCreated {
        command_id,
        agent_id: AgentId::new("a1"),
        session_id: SessionId::new("s1"),
        command_type: CommandType::StartSession,
        payload: serde_json::json!({}),
        deadline_at_ms: 5_000,
        at_ms: 0,
    });
    state.apply_event(&Event::CommandStatusChanged {
        command_id,
        status: CommandStatus::Completed,
        result: Some(serde_json::json!({"vnc_address": "10.0.0.1:5900"})),
        error: None,
        at_ms: 10,
    });
    assert_eq!(state.agents[&AgentId::new("a1")].sessions_in_use, 1);
    assert_eq!(state.commands[&command_id].status, CommandStatus::Completed);
}

#[test]
fn reapplying_the_same_status_change_does_not_double_count() {
    let mut state = MaterializedState::default();
    register_agent(&mut state, "a1", 4);
    let command_id = CommandId::new();
    state.apply_event(&Event::CommandCreated {
        command_id,
        agent_id: AgentId::new("a1"),
        session_id: SessionId::new("s1"),
        command_type: CommandType::StartSession,
        payload: serde_json::json!({}),
        deadline_at_ms: 5_000,
        at_ms: 0,
    });
    let completed = Event::CommandStatusChanged {
        command_id,
        status: CommandStatus::Completed,
        result: None,
        error: None,
        at_ms: 10,
    };
    state.apply_event(&completed);
    state.apply_event(&completed);
    assert_eq!(state.agents[&AgentId::new("a1")].sessions_in_use, 1);
}

#[test]
fn stop_session_completion_decrements_and_floors_at_zero() {
    let mut state = MaterializedState::default();
    register_agent(&mut state, "a1", 4);
    let stop_id = CommandId::new();
    state.apply_event(&Event::CommandCreated {
        command_id: stop_id,
        agent_id: AgentId::new("a1"),
        session_id: SessionId::new("s1"),
        command_type: CommandType::StopSession,
        payload: serde_json::json!({}),
        deadline_at_ms: 5_000,
        at_ms: 0,
    });
    state.apply_event(&Event::CommandStatusChanged {
        command_id: stop_id,
        status: CommandStatus::Completed,
        result: None,
        error: None,
        at_ms: 10,
    });
    assert_eq!(state.agents[&AgentId::new("a1")].sessions_in_use, 0);
}

#[test]
fn session_registered_then_state_changed_updates_projection() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::SessionRegistered {
        session_id: SessionId::new("s1"),
        agent_id: AgentId::new("a1"),
        platform: Platform::Docker,
        owner_user_id: "u1".into(),
        at_ms: 0,
    });
    assert_eq!(state.sessions[&SessionId::new("s1")].state, SessionState::Pending);
    state.apply_event(&Event::SessionStateChanged {
        session_id: SessionId::new("s1"),
        state: SessionState::Running,
        at_ms: 1,
    });
    assert_eq!(state.sessions[&SessionId::new("s1")].state, SessionState::Running);
}

#[test]
fn leaving_running_clears_vnc_address() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::SessionRegistered {
        session_id: SessionId::new("s1"),
        agent_id: AgentId::new("a1"),
        platform: Platform::Docker,
        owner_user_id: "u1".into(),
        at_ms: 0,
    });
    state.sessions.get_mut(&SessionId::new("s1")).unwrap().vnc_address = Some("10.0.0.1:5900".into());
    state.apply_event(&Event::SessionStateChanged {
        session_id: SessionId::new("s1"),
        state: SessionState::Hibernated,
        at_ms: 1,
    });
    assert!(state.sessions[&SessionId::new("s1")].vnc_address.is_none());
}

#[test]
fn tunnel_opened_then_closed_round_trips() {
    let mut state = MaterializedState::default();
    let tunnel_id = TunnelId::new();
    state.apply_event(&Event::TunnelOpened {
        tunnel_id,
        session_id: SessionId::new("s1"),
        agent_id: AgentId::new("a1"),
        at_ms: 0,
    });
    assert!(state.tunnels.contains_key(&tunnel_id));
    state.apply_event(&Event::TunnelClosed { tunnel_id, session_id: SessionId::new("s1"), at_ms: 1 });
    assert!(!state.tunnels.contains_key(&tunnel_id));
}

#[test]
fn agents_online_filters_deleted_and_offline() {
    let mut state = MaterializedState::default();
    register_agent(&mut state, "a1", 4);
    register_agent(&mut state, "a2", 4);
    state.apply_event(&Event::AgentDisconnected { agent_id: AgentId::new("a2"), replica_id: "r1".into(), at_ms: 1 });
    let online = state.agents_online(None, None);
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].agent_id, AgentId::new("a1"));
}
