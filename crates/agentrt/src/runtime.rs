// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Ties the link, leader election, command execution, and VNC pumping
//! together into the one process described by §4.7.

use crate::commands;
use crate::config::Config;
use crate::driver::docker::DockerDriver;
use crate::driver::kubernetes::KubernetesDriver;
use crate::driver::PlatformDriver;
use crate::election;
use crate::link::LinkClient;
use crate::vnc::VncSessions;
use kh_core::{AgentId, Capacity, Platform};
use kh_wire::HubMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let driver: Arc<dyn PlatformDriver> = match config.platform {
        Platform::Docker => Arc::new(DockerDriver::new(config.docker_image.clone())),
        Platform::Kubernetes => {
            let client = kube::Client::try_default().await?;
            Arc::new(KubernetesDriver::new(client, config.k8s_namespace.clone(), config.docker_image.clone()))
        }
    };

    let is_leader = Arc::new(AtomicBool::new(false));
    let elector = election::build_elector(&config).await?;
    let leader_for_elected = Arc::clone(&is_leader);
    let leader_for_lost = Arc::clone(&is_leader);
    elector
        .start(
            config.agent_id.clone(),
            election::callbacks(
                move || {
                    leader_for_elected.store(true, Ordering::Release);
                    info!("elected leader");
                },
                || {
                    debug!("renewed leadership");
                },
                move || {
                    leader_for_lost.store(false, Ordering::Release);
                    warn!("lost leadership");
                },
            ),
        )
        .await?;

    let agent_id = AgentId::new(config.agent_id.clone());
    let capacity = Capacity { max_sessions: config.capacity.max_sessions, cpu_millis: config.capacity.cpu_millis, memory_mb: config.capacity.memory_mb };
    let (link, mut inbound_rx) = LinkClient::spawn(
        config.hub_url.clone(),
        agent_id.clone(),
        config.platform,
        config.region.clone(),
        capacity,
        Default::default(),
        config.reconnect_min(),
        config.reconnect_max(),
    );
    let link = Arc::new(link);

    let vnc = Arc::new(VncSessions::new());
    let heartbeat_agent_id = agent_id.clone();
    let heartbeat_link = Arc::clone(&link);
    let heartbeat_leader = Arc::clone(&is_leader);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            heartbeat_link
                .send(kh_wire::AgentMessage::Heartbeat { agent_id: heartbeat_agent_id.clone(), timestamp: now_ms() })
                .await;
            heartbeat_link
                .send(kh_wire::AgentMessage::Status { agent_id: heartbeat_agent_id.clone(), draining: !heartbeat_leader.load(Ordering::Acquire), timestamp: now_ms() })
                .await;
        }
    });

    while let Some(message) = inbound_rx.recv().await {
        handle_hub_message(message, &driver, &link, &vnc, &is_leader).await;
    }

    Ok(())
}

async fn handle_hub_message(message: HubMessage, driver: &Arc<dyn PlatformDriver>, link: &Arc<LinkClient>, vnc: &Arc<VncSessions>, is_leader: &Arc<AtomicBool>) {
    match message {
        HubMessage::RegisterAck { heartbeat_interval_secs } => {
            info!(heartbeat_interval_secs, "registered with hub");
        }
        HubMessage::Command { command_id, session_id, command_type, payload, .. } => {
            if !is_leader.load(Ordering::Acquire) {
                warn!(%session_id, "dropping command received while not leader");
                return;
            }
            match command_type {
                kh_core::CommandType::VncConnect => {
                    vnc.connect(Arc::clone(driver), Arc::clone(link), session_id).await;
                }
                kh_core::CommandType::VncDisconnect => {
                    vnc.disconnect(&session_id);
                }
                other => commands::handle_command(Arc::clone(driver), Arc::clone(link), command_id, session_id, other, payload),
            }
        }
        HubMessage::Shutdown => {
            info!("hub requested shutdown, link will reconnect on next attempt");
        }
        HubMessage::VncData { session_id, data } => match base64_decode(&data) {
            Ok(bytes) => vnc.on_data(&session_id, bytes).await,
            Err(e) => warn!(%session_id, "dropped malformed vnc_data frame: {e}"),
        },
        HubMessage::VncDisconnect { session_id } => vnc.disconnect(&session_id),
    }
}

fn base64_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.decode(data)
}

fn now_ms() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
