// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

use super::*;

#[test]
fn agent_status_patch_rejects_offline() {
    let json = r#"{"status":"offline"}"#;
    let decoded: Result<AgentStatusPatch, _> = serde_json::from_str(json);
    assert!(decoded.is_err(), "offline is not an operator-settable target");
}

#[test]
fn agent_status_patch_accepts_draining() {
    let json = r#"{"status":"draining"}"#;
    let decoded: AgentStatusPatch = serde_json::from_str(json).expect("deserialize");
    assert_eq!(decoded.status, AgentStatusTarget::Draining);
}

#[test]
fn agent_detail_flattens_summary_fields() {
    let detail = AgentDetail {
        summary: AgentSummary {
            agent_id: AgentId::new("a1"),
            platform: Platform::Docker,
            region: "local".into(),
            status: "online".into(),
            sessions_in_use: 0,
            max_sessions: 4,
        },
        metadata: HashMap::new(),
        sessions: vec![],
        last_heartbeat_ms: 123,
    };
    let json = serde_json::to_value(&detail).expect("serialize");
    assert_eq!(json["agent_id"], serde_json::json!("a1"));
    assert_eq!(json["max_sessions"], serde_json::json!(4));
}

#[test]
fn error_envelope_round_trips() {
    let env = ErrorEnvelope {
        error: "not_found".into(),
        message: "no such session".into(),
        code: 404,
        details: None,
        timestamp: 0,
        request_id: "req-1".into(),
    };
    let json = serde_json::to_string(&env).expect("serialize");
    let parsed: ErrorEnvelope = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, env);
}

#[test]
fn session_state_patch_uses_snake_case() {
    let json = r#"{"state":"hibernated"}"#;
    let decoded: SessionStatePatch = serde_json::from_str(json).expect("deserialize");
    assert_eq!(decoded.state, SessionState::Hibernated);
}
