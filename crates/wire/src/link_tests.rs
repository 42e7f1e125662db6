// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

use super::*;
use kh_core::{CommandId, SessionId};

#[test]
fn register_round_trips_with_tag() {
    let msg = AgentMessage::Register {
        agent_id: AgentId::new("k8s-a"),
        platform: Platform::Kubernetes,
        region: "us-east-1".into(),
        capacity: RegisterCapacity { max_sessions: 10, cpu_millis: None, memory_mb: None },
        metadata: HashMap::new(),
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    assert!(json.contains("\"type\":\"Register\""));
    let parsed: AgentMessage = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, msg);
}

#[test]
fn heartbeat_decodes_minimal_payload() {
    let json = r#"{"type":"Heartbeat","agent_id":"a1","timestamp":42}"#;
    let decoded: AgentMessage = serde_json::from_str(json).expect("deserialize");
    match decoded {
        AgentMessage::Heartbeat { agent_id, timestamp } => {
            assert_eq!(agent_id, AgentId::new("a1"));
            assert_eq!(timestamp, 42);
        }
        other => panic!("expected Heartbeat, got {other:?}"),
    }
}

#[test]
fn register_ack_is_hub_only() {
    let msg = HubMessage::RegisterAck { heartbeat_interval_secs: 10 };
    let json = serde_json::to_string(&msg).expect("serialize");
    let parsed: HubMessage = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, msg);
}

#[test]
fn command_envelope_carries_deadline() {
    let msg = HubMessage::Command {
        command_id: CommandId::new(),
        session_id: SessionId::new("sess-1"),
        command_type: CommandType::StartSession,
        payload: serde_json::json!({"template": "default"}),
        deadline_at_ms: 5_000,
    };
    let json = serde_json::to_string(&msg).expect("serialize");
    let parsed: HubMessage = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, msg);
}

#[test]
fn register_ack_cannot_be_mistaken_for_an_agent_message() {
    let hub_only = HubMessage::RegisterAck { heartbeat_interval_secs: 10 };
    let json = serde_json::to_string(&hub_only).expect("serialize");
    assert!(serde_json::from_str::<AgentMessage>(&json).is_err());
}

#[test]
fn register_cannot_be_mistaken_for_a_hub_message() {
    let agent_only = AgentMessage::Register {
        agent_id: AgentId::new("a1"),
        platform: Platform::Docker,
        region: "local".into(),
        capacity: RegisterCapacity { max_sessions: 4, cpu_millis: None, memory_mb: None },
        metadata: HashMap::new(),
    };
    let json = serde_json::to_string(&agent_only).expect("serialize");
    assert!(serde_json::from_str::<HubMessage>(&json).is_err());
}
