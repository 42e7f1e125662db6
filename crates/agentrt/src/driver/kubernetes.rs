// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! `KubernetesDriver`: one `Pod` per session, following the same
//! provisioning shape the teacher repo's k8s adapter uses for its agent
//! pods. Hibernation has no native bare-`Pod` equivalent, so it deletes the
//! pod and keeps the spec in memory to recreate on wake — the session's own
//! process state is lost either way, which is a property of the platform,
//! not something this driver can paper over.

use super::{DriverError, PlatformDriver, PortForward};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, ContainerPort, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kh_core::SessionId;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

const CONTAINER_RFB_PORT: i32 = 5900;

struct SessionSpec {
    pod_name: String,
    template: String,
}

pub struct KubernetesDriver {
    client: Client,
    namespace: String,
    image: String,
    sessions: Arc<Mutex<HashMap<SessionId, SessionSpec>>>,
}

impl KubernetesDriver {
    pub fn new(client: Client, namespace: impl Into<String>, image: impl Into<String>) -> Self {
        Self { client, namespace: namespace.into(), image: image.into(), sessions: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn build_pod(&self, pod_name: &str, template: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(pod_name.to_string()),
                labels: Some(HashMap::from([("kiosk-hub/template".to_string(), template.to_string())])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "session".to_string(),
                    image: Some(self.image.clone()),
                    ports: Some(vec![ContainerPort { container_port: CONTAINER_RFB_PORT, ..Default::default() }]),
                    ..Default::default()
                }],
                restart_policy: Some("Never".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn delete_pod(&self, pod_name: &str) -> Result<(), DriverError> {
        self.pods().delete(pod_name, &DeleteParams::default()).await.map_err(|e| DriverError::Kube(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PlatformDriver for KubernetesDriver {
    async fn start_session(&self, session_id: &SessionId, template: &str, _metadata: &serde_json::Value) -> Result<serde_json::Value, DriverError> {
        let pod_name = format!("kh-session-{session_id}");
        let pod = self.build_pod(&pod_name, template);
        self.pods().create(&PostParams::default(), &pod).await.map_err(|e| DriverError::Kube(e.to_string()))?;

        self.sessions.lock().insert(session_id.clone(), SessionSpec { pod_name: pod_name.clone(), template: template.to_string() });
        Ok(serde_json::json!({ "pod_name": pod_name }))
    }

    async fn stop_session(&self, session_id: &SessionId) -> Result<(), DriverError> {
        let pod_name = {
            let sessions = self.sessions.lock();
            sessions.get(session_id).map(|s| s.pod_name.clone()).ok_or_else(|| DriverError::NotFound(session_id.clone()))?
        };
        self.delete_pod(&pod_name).await?;
        self.sessions.lock().remove(session_id);
        Ok(())
    }

    async fn hibernate_session(&self, session_id: &SessionId) -> Result<(), DriverError> {
        let pod_name = {
            let sessions = self.sessions.lock();
            sessions.get(session_id).map(|s| s.pod_name.clone()).ok_or_else(|| DriverError::NotFound(session_id.clone()))?
        };
        self.delete_pod(&pod_name).await
    }

    async fn wake_session(&self, session_id: &SessionId) -> Result<(), DriverError> {
        let template = {
            let sessions = self.sessions.lock();
            sessions.get(session_id).map(|s| s.template.clone()).ok_or_else(|| DriverError::NotFound(session_id.clone()))?
        };
        self.start_session(session_id, &template, &serde_json::json!({})).await.map(|_| ())
    }

    async fn port_forward(&self, session_id: &SessionId) -> Result<PortForward, DriverError> {
        let pod_name = {
            let sessions = self.sessions.lock();
            sessions.get(session_id).map(|s| s.pod_name.clone()).ok_or_else(|| DriverError::NotFound(session_id.clone()))?
        };
        let mut forwarder = self
            .pods()
            .portforward(&pod_name, &[CONTAINER_RFB_PORT as u16])
            .await
            .map_err(|e| DriverError::Kube(e.to_string()))?;
        let stream = forwarder
            .take_stream(CONTAINER_RFB_PORT as u16)
            .ok_or_else(|| DriverError::Kube("portforward stream unavailable".to_string()))?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.map_err(|e| DriverError::CommandFailed(e.to_string()))?;
        let local_port = listener.local_addr().map_err(|e| DriverError::CommandFailed(e.to_string()))?.port();

        tokio::spawn(async move {
            if let Ok((tcp_stream, _)) = listener.accept().await {
                let (mut tcp_read, mut tcp_write) = tokio::io::split(tcp_stream);
                let (mut pf_read, mut pf_write) = tokio::io::split(stream);
                let _ = tokio::join!(
                    tokio::io::copy(&mut tcp_read, &mut pf_write),
                    tokio::io::copy(&mut pf_read, &mut tcp_write),
                );
            }
        });

        Ok(PortForward { local_port })
    }
}
