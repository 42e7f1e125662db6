// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! `PlatformDriver` (§4.7): the seam between command execution and the
//! platform SDK a deployment actually runs on. Only the interface is
//! specified; `KubernetesDriver` and `DockerDriver` are reference
//! implementations a real deployment may swap out entirely.

pub mod docker;
pub mod kubernetes;

use async_trait::async_trait;
use kh_core::SessionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("platform command failed: {0}")]
    CommandFailed(String),
    #[error("session not found: {0}")]
    NotFound(SessionId),
    #[error("kubernetes API error: {0}")]
    Kube(String),
}

/// A forwarded local TCP port relaying bytes to a session's RFB port.
pub struct PortForward {
    pub local_port: u16,
}

#[async_trait]
pub trait PlatformDriver: Send + Sync {
    async fn start_session(&self, session_id: &SessionId, template: &str, metadata: &serde_json::Value) -> Result<serde_json::Value, DriverError>;

    async fn stop_session(&self, session_id: &SessionId) -> Result<(), DriverError>;

    async fn hibernate_session(&self, session_id: &SessionId) -> Result<(), DriverError>;

    async fn wake_session(&self, session_id: &SessionId) -> Result<(), DriverError>;

    /// Opens a local ephemeral port forwarding to the session container's
    /// RFB port. Torn down by dropping the returned handle.
    async fn port_forward(&self, session_id: &SessionId) -> Result<PortForward, DriverError>;
}
