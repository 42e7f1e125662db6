// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Agent Link (C3), client side: dials `kh-daemon`'s `/agent/ws`, registers,
//! and reconnects with the exponential backoff §4.3 specifies (2s up to
//! 32s) on any loss. One `LinkClient` instance is exactly one link; this
//! process holds exactly one for its whole lifetime.

use futures_util::{SinkExt, StreamExt};
use kh_core::{AgentId, Capacity, Platform};
use kh_wire::{AgentMessage, HubMessage, RegisterCapacity};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

pub struct LinkClient {
    outbound_tx: mpsc::Sender<AgentMessage>,
}

impl LinkClient {
    /// Spawns the reconnect loop and returns a handle plus the channel of
    /// messages received from the hub. The loop runs until the process
    /// exits; there is no explicit stop.
    pub fn spawn(
        url: String,
        agent_id: AgentId,
        platform: Platform,
        region: String,
        capacity: Capacity,
        metadata: HashMap<String, String>,
        backoff_min: Duration,
        backoff_max: Duration,
    ) -> (Self, mpsc::Receiver<HubMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        tokio::spawn(reconnect_loop(url, agent_id, platform, region, capacity, metadata, backoff_min, backoff_max, outbound_rx, inbound_tx));

        (Self { outbound_tx }, inbound_rx)
    }

    pub async fn send(&self, message: AgentMessage) {
        let _ = self.outbound_tx.send(message).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn reconnect_loop(
    url: String,
    agent_id: AgentId,
    platform: Platform,
    region: String,
    capacity: Capacity,
    metadata: HashMap<String, String>,
    backoff_min: Duration,
    backoff_max: Duration,
    mut outbound_rx: mpsc::Receiver<AgentMessage>,
    inbound_tx: mpsc::Sender<HubMessage>,
) {
    let mut backoff = backoff_min;
    loop {
        match connect_and_pump(&url, &agent_id, platform, &region, &capacity, &metadata, &mut outbound_rx, &inbound_tx).await {
            Ok(()) => {
                warn!(%agent_id, "link closed, reconnecting");
            }
            Err(e) => {
                warn!(%agent_id, "link error: {e}, retrying in {backoff:?}");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(backoff_max);
    }
}

#[allow(clippy::too_many_arguments)]
async fn connect_and_pump(
    url: &str,
    agent_id: &AgentId,
    platform: Platform,
    region: &str,
    capacity: &Capacity,
    metadata: &HashMap<String, String>,
    outbound_rx: &mut mpsc::Receiver<AgentMessage>,
    inbound_tx: &mpsc::Sender<HubMessage>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut write, mut read) = ws_stream.split();

    let register = AgentMessage::Register {
        agent_id: agent_id.clone(),
        platform,
        region: region.to_string(),
        capacity: RegisterCapacity { max_sessions: capacity.max_sessions, cpu_millis: capacity.cpu_millis, memory_mb: capacity.memory_mb },
        metadata: metadata.clone(),
    };
    write.send(Message::Text(serde_json::to_string(&register).unwrap_or_default())).await?;
    info!(%agent_id, "link registering");

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                let Some(message) = outgoing else { return Ok(()) };
                let Ok(payload) = serde_json::to_string(&message) else { continue };
                write.send(Message::Text(payload)).await?;
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<HubMessage>(&text) {
                            Ok(message) => { let _ = inbound_tx.send(message).await; }
                            Err(e) => warn!("dropped malformed hub message: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e),
                }
            }
        }
    }
}
