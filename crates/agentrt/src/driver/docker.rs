// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! `DockerDriver`: shells out to the local `docker` CLI for container
//! lifecycle, the way a standalone single-host deployment runs sessions.
//! Docker's own `-p host:5900` port mapping doubles as the RFB forward, so
//! `port_forward` only has to look the published port back up.

use super::{DriverError, PlatformDriver, PortForward};
use async_trait::async_trait;
use kh_core::SessionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

const CONTAINER_RFB_PORT: u16 = 5900;

struct ContainerMeta {
    container_name: String,
    host_port: u16,
}

pub struct DockerDriver {
    image: String,
    containers: Arc<Mutex<HashMap<SessionId, ContainerMeta>>>,
    port_counter: Arc<AtomicU16>,
}

impl DockerDriver {
    pub fn new(image: impl Into<String>) -> Self {
        let base_port: u16 = std::env::var("KH_DOCKER_BASE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(5_900);
        Self { image: image.into(), containers: Arc::new(Mutex::new(HashMap::new())), port_counter: Arc::new(AtomicU16::new(base_port)) }
    }

    fn next_port(&self) -> u16 {
        self.port_counter.fetch_add(1, Ordering::Relaxed)
    }

    async fn run_docker(args: &[&str]) -> Result<String, DriverError> {
        let output = tokio::process::Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| DriverError::CommandFailed(format!("failed to exec docker: {e}")))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DriverError::CommandFailed(format!("docker {} failed: {}", args.first().unwrap_or(&""), stderr.trim())))
        }
    }

    fn meta_for(&self, session_id: &SessionId) -> Result<String, DriverError> {
        self.containers
            .lock()
            .get(session_id)
            .map(|m| m.container_name.clone())
            .ok_or_else(|| DriverError::NotFound(session_id.clone()))
    }
}

#[async_trait]
impl PlatformDriver for DockerDriver {
    async fn start_session(&self, session_id: &SessionId, template: &str, _metadata: &serde_json::Value) -> Result<serde_json::Value, DriverError> {
        let container_name = format!("kh-session-{session_id}");
        let host_port = self.next_port();
        let port_mapping = format!("{host_port}:{CONTAINER_RFB_PORT}");

        Self::run_docker(&["run", "-d", "--name", &container_name, "-p", &port_mapping, "-e", &format!("KH_TEMPLATE={template}"), &self.image])
            .await?;

        self.containers.lock().insert(session_id.clone(), ContainerMeta { container_name: container_name.clone(), host_port });
        Ok(serde_json::json!({ "container_name": container_name, "vnc_port": host_port }))
    }

    async fn stop_session(&self, session_id: &SessionId) -> Result<(), DriverError> {
        let container_name = self.meta_for(session_id)?;
        Self::run_docker(&["rm", "-f", &container_name]).await?;
        self.containers.lock().remove(session_id);
        Ok(())
    }

    async fn hibernate_session(&self, session_id: &SessionId) -> Result<(), DriverError> {
        let container_name = self.meta_for(session_id)?;
        Self::run_docker(&["pause", &container_name]).await?;
        Ok(())
    }

    async fn wake_session(&self, session_id: &SessionId) -> Result<(), DriverError> {
        let container_name = self.meta_for(session_id)?;
        Self::run_docker(&["unpause", &container_name]).await?;
        Ok(())
    }

    async fn port_forward(&self, session_id: &SessionId) -> Result<PortForward, DriverError> {
        let host_port = self
            .containers
            .lock()
            .get(session_id)
            .map(|m| m.host_port)
            .ok_or_else(|| DriverError::NotFound(session_id.clone()))?;
        Ok(PortForward { local_port: host_port })
    }
}
