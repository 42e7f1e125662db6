// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Agent-side half of the VNC Proxy (§4.7): on `vnc_connect`, open the
//! driver's port-forward to the session's RFB port and start pumping bytes
//! in both directions over the link; emit `vnc_ready` once the local socket
//! is live, `vnc_error` if the forward never opens.

use crate::driver::PlatformDriver;
use crate::link::LinkClient;
use kh_core::SessionId;
use kh_wire::AgentMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::warn;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

pub struct VncSessions {
    inbound: Mutex<HashMap<SessionId, mpsc::Sender<Vec<u8>>>>,
}

impl Default for VncSessions {
    fn default() -> Self {
        Self::new()
    }
}

impl VncSessions {
    pub fn new() -> Self {
        Self { inbound: Mutex::new(HashMap::new()) }
    }

    /// Opens the port-forward and spawns the byte pump. Emits `vnc_ready`/
    /// `vnc_error` on the link as the attempt resolves.
    pub async fn connect(&self, driver: Arc<dyn PlatformDriver>, link: Arc<LinkClient>, session_id: SessionId) {
        let forward = match driver.port_forward(&session_id).await {
            Ok(f) => f,
            Err(e) => {
                link.send(AgentMessage::VncError { session_id, error: e.to_string(), timestamp: now_ms() }).await;
                return;
            }
        };

        let stream = match TcpStream::connect(("127.0.0.1", forward.local_port)).await {
            Ok(s) => s,
            Err(e) => {
                link.send(AgentMessage::VncError { session_id, error: e.to_string(), timestamp: now_ms() }).await;
                return;
            }
        };

        let (browser_tx, mut browser_rx) = mpsc::channel::<Vec<u8>>(256);
        self.inbound.lock().insert(session_id.clone(), browser_tx);

        link.send(AgentMessage::VncReady { session_id: session_id.clone(), timestamp: now_ms() }).await;

        let (mut read_half, mut write_half) = stream.into_split();
        let link_for_read = Arc::clone(&link);
        let session_for_read = session_id.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 16 * 1024];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        use base64::Engine as _;
                        let encoded = base64::engine::general_purpose::STANDARD.encode(&buf[..n]);
                        link_for_read.send(AgentMessage::VncData { session_id: session_for_read.clone(), data: encoded }).await;
                    }
                }
            }
            link_for_read.send(AgentMessage::VncDisconnect { session_id: session_for_read }).await;
        });

        tokio::spawn(async move {
            while let Some(data) = browser_rx.recv().await {
                if write_half.write_all(&data).await.is_err() {
                    break;
                }
            }
        });
    }

    /// Browser-origin bytes (already base64-decoded by the runtime) bound
    /// for the session's RFB port.
    pub async fn on_data(&self, session_id: &SessionId, data: Vec<u8>) {
        let sender = self.inbound.lock().get(session_id).cloned();
        if let Some(sender) = sender {
            if sender.send(data).await.is_err() {
                warn!(%session_id, "vnc forward channel closed");
            }
        }
    }

    pub fn disconnect(&self, session_id: &SessionId) {
        self.inbound.lock().remove(session_id);
    }
}
