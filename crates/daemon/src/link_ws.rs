// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Agent Link (C3): the `GET /agent/ws` WebSocket handler. One socket is
//! exactly one agent process; the first inbound frame must be `register`,
//! everything after that is routed to the Agent Hub, Command Dispatcher, or
//! VNC Proxy depending on message type.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use kh_core::{AgentId, Clock};
use kh_wire::{AgentMessage, HubMessage, RegisterCapacity};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    agent_id: Option<String>,
}

const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn handler(ws: WebSocketUpgrade, Query(query): Query<LinkQuery>, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: LinkQuery) {
    let (mut sender, mut receiver) = socket.split();

    let first = match tokio::time::timeout(REGISTER_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        _ => {
            warn!(agent_id = ?query.agent_id, "link closed before registration");
            return;
        }
    };
    let (agent_id, platform, region, capacity, metadata) = match serde_json::from_str::<AgentMessage>(&first) {
        Ok(AgentMessage::Register { agent_id, platform, region, capacity, metadata }) => {
            (agent_id, platform, region, capacity, metadata)
        }
        _ => {
            warn!("first link message was not register, closing");
            return;
        }
    };

    let heartbeat_interval_secs = state.config.heartbeat_interval_secs as u32;
    let heartbeat_ttl = state.config.heartbeat_ttl();

    let (link_tx, mut link_rx) = mpsc::channel::<HubMessage>(128);
    let link_tx_for_disconnect = link_tx.clone();
    if let Err(e) =
        state.hub.on_agent_registered(agent_id.clone(), platform, region, capacity_from(capacity), metadata, link_tx).await
    {
        warn!(%agent_id, "failed to register agent: {e}");
        return;
    }

    let ack = HubMessage::RegisterAck { heartbeat_interval_secs };
    if let Ok(payload) = serde_json::to_string(&ack) {
        if sender.send(Message::Text(payload)).await.is_err() {
            state.hub.on_agent_disconnected(&agent_id, &link_tx_for_disconnect).await.ok();
            return;
        }
    }
    info!(%agent_id, %platform, "agent link established");

    let mut outbound = tokio::spawn(async move {
        while let Some(message) = link_rx.recv().await {
            let Ok(payload) = serde_json::to_string(&message) else { continue };
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let agent_id_for_inbound = agent_id.clone();
    let state_for_inbound = Arc::clone(&state);
    let mut inbound = tokio::spawn(async move {
        loop {
            let next = tokio::time::timeout(heartbeat_ttl, receiver.next()).await;
            let message = match next {
                Ok(Some(Ok(Message::Text(text)))) => text,
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(_))) => break,
                Err(_) => {
                    warn!(agent_id = %agent_id_for_inbound, "link heartbeat timeout");
                    break;
                }
            };
            handle_agent_message(&state_for_inbound, &agent_id_for_inbound, &message).await;
        }
    });

    tokio::select! {
        _ = &mut outbound => inbound.abort(),
        _ = &mut inbound => outbound.abort(),
    }

    state.hub.on_agent_disconnected(&agent_id, &link_tx_for_disconnect).await.ok();
    state.vnc.close_tunnels_for_agent(&agent_id);
    info!(%agent_id, "agent link closed");
}

async fn handle_agent_message(state: &Arc<AppState>, agent_id: &AgentId, raw: &str) {
    let message = match serde_json::from_str::<AgentMessage>(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(%agent_id, "dropped malformed agent message: {e}");
            return;
        }
    };

    match message {
        AgentMessage::Register { .. } => {
            warn!(%agent_id, "ignoring duplicate register on established link");
        }
        AgentMessage::Heartbeat { .. } => {
            let _ = state.hub.refresh_heartbeat(agent_id).await;
        }
        AgentMessage::Ack { command_id, .. } => {
            state.dispatcher.on_ack(command_id);
        }
        AgentMessage::Complete { command_id, result, .. } => {
            state.dispatcher.on_complete(command_id, Some(result));
        }
        AgentMessage::Fail { command_id, error, .. } => {
            state.dispatcher.on_fail(command_id, error);
        }
        AgentMessage::Status { draining, .. } => {
            let _ = state.store.apply(kh_core::Event::AgentDraining {
                agent_id: agent_id.clone(),
                draining,
                at_ms: kh_core::SystemClock.epoch_ms(),
            });
        }
        AgentMessage::VncReady { session_id, .. } => {
            state.vnc.on_vnc_ready(&session_id);
        }
        AgentMessage::VncError { session_id, error, .. } => {
            state.vnc.on_vnc_error(&session_id, error).await;
        }
        AgentMessage::VncData { session_id, data } => match base64::engine::general_purpose::STANDARD.decode(data) {
            Ok(bytes) => state.vnc.on_vnc_data(&session_id, bytes).await,
            Err(e) => warn!(%session_id, "dropped malformed vnc_data frame: {e}"),
        },
        AgentMessage::VncDisconnect { session_id } => {
            state.vnc.on_agent_disconnect(&session_id).await;
        }
    }
}

fn capacity_from(capacity: RegisterCapacity) -> kh_core::Capacity {
    kh_core::Capacity { max_sessions: capacity.max_sessions, cpu_millis: capacity.cpu_millis, memory_mb: capacity.memory_mb }
}
