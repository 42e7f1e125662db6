// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! `GET /vnc-viewer/{session_id}` (§6.3): the browser-facing half of the VNC
//! Proxy. Binary WebSocket frames in either direction are raw RFB bytes;
//! there is no JSON envelope on this path, unlike the agent link.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use kh_core::{SessionId, SessionState};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    token: Option<String>,
}

pub async fn handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<ViewerQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let authorized = query.token.as_deref().is_some_and(|t| !state.config.auth_token.is_empty() && t == state.config.auth_token);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let session_id = SessionId::new(session_id);
    let session = state.store.read(|s| s.sessions.get(&session_id).cloned());
    let Some(session) = session else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if session.state != SessionState::Running {
        return StatusCode::CONFLICT.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, session.agent_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: SessionId, agent_id: kh_core::AgentId) {
    let attached = match state.vnc.attach(session_id.clone(), agent_id).await {
        Ok(a) => a,
        Err(e) => {
            warn!(%session_id, "vnc viewer attach failed: {e}");
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();
    let mut to_browser = attached.to_browser;

    let session_for_outbound = session_id.clone();
    let mut outbound = tokio::spawn(async move {
        while let Some(data) = to_browser.recv().await {
            if sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
        let _ = session_for_outbound;
    });

    let state_for_inbound = Arc::clone(&state);
    let session_for_inbound = session_id.clone();
    let mut inbound = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Binary(data) => {
                    state_for_inbound.vnc.send_from_browser(&session_for_inbound, data).await;
                }
                Message::Close(_) => break,
                _ => continue,
            }
        }
    });

    tokio::select! {
        _ = &mut outbound => inbound.abort(),
        _ = &mut inbound => outbound.abort(),
    }

    state.vnc.detach(&session_id).await;
    info!(%session_id, "vnc viewer disconnected");
}
