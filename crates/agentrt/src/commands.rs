// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Executes a dispatched `command` envelope against the configured
//! `PlatformDriver` (§4.7): ack immediately, run asynchronously, reply
//! `complete`/`fail` exactly once. VNC commands are handled by [`crate::vnc`]
//! instead since they open a standing tunnel rather than a one-shot result.

use crate::driver::{DriverError, PlatformDriver};
use crate::link::LinkClient;
use kh_core::{CommandId, CommandType, SessionId};
use kh_wire::AgentMessage;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Spawns the ack-then-execute flow for one command. Runs detached; replies
/// go back over `link` as they become available.
pub fn handle_command(
    driver: Arc<dyn PlatformDriver>,
    link: Arc<LinkClient>,
    command_id: CommandId,
    session_id: SessionId,
    command_type: CommandType,
    payload: serde_json::Value,
) {
    tokio::spawn(async move {
        link.send(AgentMessage::Ack { command_id, timestamp: now_ms() }).await;

        let outcome = execute(driver.as_ref(), &session_id, command_type, &payload).await;
        match outcome {
            Ok(result) => link.send(AgentMessage::Complete { command_id, result, timestamp: now_ms() }).await,
            Err(e) => {
                warn!(%session_id, ?command_type, "command failed: {e}");
                link.send(AgentMessage::Fail { command_id, error: e.to_string(), timestamp: now_ms() }).await;
            }
        }
    });
}

async fn execute(
    driver: &dyn PlatformDriver,
    session_id: &SessionId,
    command_type: CommandType,
    payload: &serde_json::Value,
) -> Result<serde_json::Value, DriverError> {
    match command_type {
        CommandType::StartSession => {
            let template = payload.get("template").and_then(|v| v.as_str()).unwrap_or_default();
            let metadata = payload.get("metadata").cloned().unwrap_or(serde_json::json!({}));
            driver.start_session(session_id, template, &metadata).await
        }
        CommandType::StopSession => driver.stop_session(session_id).await.map(|_| serde_json::json!({})),
        CommandType::HibernateSession => driver.hibernate_session(session_id).await.map(|_| serde_json::json!({})),
        CommandType::WakeSession => driver.wake_session(session_id).await.map(|_| serde_json::json!({})),
        CommandType::VncConnect | CommandType::VncDisconnect => {
            Ok(serde_json::json!({})) // handled by crate::vnc, never dispatched here
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PortForward;
    use async_trait::async_trait;

    struct StubDriver;

    #[async_trait]
    impl PlatformDriver for StubDriver {
        async fn start_session(&self, _: &SessionId, template: &str, _: &serde_json::Value) -> Result<serde_json::Value, DriverError> {
            Ok(serde_json::json!({ "template": template }))
        }
        async fn stop_session(&self, _: &SessionId) -> Result<(), DriverError> {
            Ok(())
        }
        async fn hibernate_session(&self, _: &SessionId) -> Result<(), DriverError> {
            Ok(())
        }
        async fn wake_session(&self, _: &SessionId) -> Result<(), DriverError> {
            Ok(())
        }
        async fn port_forward(&self, _: &SessionId) -> Result<PortForward, DriverError> {
            Ok(PortForward { local_port: 0 })
        }
    }

    #[tokio::test]
    async fn start_session_echoes_template_in_result() {
        let driver = StubDriver;
        let result = execute(&driver, &SessionId::new("s1"), CommandType::StartSession, &serde_json::json!({ "template": "ubuntu-desktop" }))
            .await
            .expect("start_session succeeds");
        assert_eq!(result["template"], "ubuntu-desktop");
    }

    #[tokio::test]
    async fn vnc_commands_are_not_executed_here() {
        let driver = StubDriver;
        let result = execute(&driver, &SessionId::new("s1"), CommandType::VncConnect, &serde_json::json!({})).await;
        assert_eq!(result.expect("no-op ok"), serde_json::json!({}));
    }
}
