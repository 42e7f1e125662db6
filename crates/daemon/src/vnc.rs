// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! VNC Proxy (C6): per-replica tunnel bookkeeping and the browser<->agent
//! byte relay. Data frames never cross the Command Dispatcher (C5) — only
//! the initial `vnc_connect` does — so a slow or stalled viewer can't back
//! up command dispatch for unrelated sessions.

use crate::dispatcher::CommandDispatcher;
use crate::error::DaemonError;
use crate::hub::{AgentHub, SendOutcome};
use crate::store::Store;
use kh_core::{AgentId, Clock, DoubleAttachPolicy, Event, SessionId, TunnelId};
use kh_wire::HubMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("session already has an attached viewer")]
    AlreadyAttached,
    #[error("agent unreachable")]
    AgentUnavailable,
    #[error("agent did not confirm the port-forward: {0}")]
    ConnectFailed(String),
    #[error("timed out waiting for agent to open the port-forward")]
    ConnectTimeout,
    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

struct Tunnel {
    tunnel_id: TunnelId,
    agent_id: AgentId,
    to_browser: mpsc::Sender<Vec<u8>>,
    last_activity_ms: Arc<AtomicU64>,
}

pub struct AttachedTunnel {
    pub tunnel_id: TunnelId,
    pub to_browser: mpsc::Receiver<Vec<u8>>,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TunnelManager<C: Clock> {
    store: Arc<Store>,
    hub: Arc<AgentHub<C>>,
    dispatcher: Arc<CommandDispatcher<C>>,
    clock: C,
    double_attach_policy: DoubleAttachPolicy,
    idle_timeout: Duration,
    tunnels: Mutex<HashMap<SessionId, Tunnel>>,
    connect_waiters: Mutex<HashMap<SessionId, oneshot::Sender<Result<(), String>>>>,
}

impl<C: Clock + 'static> TunnelManager<C> {
    pub fn spawn(
        store: Arc<Store>,
        hub: Arc<AgentHub<C>>,
        dispatcher: Arc<CommandDispatcher<C>>,
        clock: C,
        double_attach_policy: DoubleAttachPolicy,
        idle_timeout: Duration,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            store,
            hub,
            dispatcher,
            clock,
            double_attach_policy,
            idle_timeout,
            tunnels: Mutex::new(HashMap::new()),
            connect_waiters: Mutex::new(HashMap::new()),
        });

        let reaper = Arc::clone(&manager);
        tokio::spawn(async move { reaper.reap_idle_loop().await });

        manager
    }

    async fn reap_idle_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let now = self.clock.epoch_ms();
            let idle: Vec<SessionId> = {
                let tunnels = self.tunnels.lock();
                tunnels
                    .iter()
                    .filter(|(_, t)| {
                        now.saturating_sub(t.last_activity_ms.load(Ordering::Relaxed))
                            >= self.idle_timeout.as_millis() as u64
                    })
                    .map(|(session_id, _)| session_id.clone())
                    .collect()
            };
            for session_id in idle {
                warn!(%session_id, "vnc tunnel idle timeout, tearing down");
                self.detach(&session_id).await;
            }
        }
    }

    /// Attaches a browser viewer to `session_id`'s tunnel, dispatching
    /// `vnc_connect` through the Command Dispatcher and waiting for the
    /// agent's `vnc_ready`/`vnc_error` signal.
    pub async fn attach(&self, session_id: SessionId, agent_id: AgentId) -> Result<AttachedTunnel, AttachError> {
        {
            let existing = self.tunnels.lock().contains_key(&session_id);
            if existing {
                match self.double_attach_policy {
                    DoubleAttachPolicy::Reject => return Err(AttachError::AlreadyAttached),
                    DoubleAttachPolicy::Supersede => self.detach(&session_id).await,
                }
            }
        }

        let tunnel_id = TunnelId::new();
        let (to_browser_tx, to_browser_rx) = mpsc::channel(256);
        let last_activity_ms = Arc::new(AtomicU64::new(self.clock.epoch_ms()));
        self.tunnels.lock().insert(
            session_id.clone(),
            Tunnel { tunnel_id, agent_id: agent_id.clone(), to_browser: to_browser_tx, last_activity_ms },
        );
        self.store.apply(Event::TunnelOpened {
            tunnel_id,
            session_id: session_id.clone(),
            agent_id: agent_id.clone(),
            at_ms: self.clock.epoch_ms(),
        })?;

        let (ready_tx, ready_rx) = oneshot::channel();
        self.connect_waiters.lock().insert(session_id.clone(), ready_tx);

        let enqueue_result = self
            .dispatcher
            .enqueue(
                agent_id,
                session_id.clone(),
                kh_core::CommandType::VncConnect,
                serde_json::json!({}),
                Some(CONNECT_TIMEOUT),
            )
            .await;
        if enqueue_result.is_err() {
            self.connect_waiters.lock().remove(&session_id);
            self.remove_tunnel(&session_id);
            return Err(AttachError::AgentUnavailable);
        }

        let outcome = tokio::time::timeout(CONNECT_TIMEOUT, ready_rx).await;
        match outcome {
            Ok(Ok(Ok(()))) => {
                info!(%session_id, "vnc tunnel attached");
                Ok(AttachedTunnel { tunnel_id, to_browser: to_browser_rx })
            }
            Ok(Ok(Err(error))) => {
                self.remove_tunnel(&session_id);
                Err(AttachError::ConnectFailed(error))
            }
            Ok(Err(_)) | Err(_) => {
                self.connect_waiters.lock().remove(&session_id);
                self.remove_tunnel(&session_id);
                Err(AttachError::ConnectTimeout)
            }
        }
    }

    pub fn on_vnc_ready(&self, session_id: &SessionId) {
        if let Some(waiter) = self.connect_waiters.lock().remove(session_id) {
            let _ = waiter.send(Ok(()));
        }
    }

    pub async fn on_vnc_error(&self, session_id: &SessionId, error: String) {
        if let Some(waiter) = self.connect_waiters.lock().remove(session_id) {
            let _ = waiter.send(Err(error));
            return;
        }
        warn!(%session_id, %error, "vnc tunnel error after attach, tearing down");
        self.detach(session_id).await;
    }

    /// Agent-side bytes (already base64-decoded by the link handler) bound
    /// for the browser.
    pub async fn on_vnc_data(&self, session_id: &SessionId, data: Vec<u8>) {
        let (to_browser, last_activity) = {
            let tunnels = self.tunnels.lock();
            match tunnels.get(session_id) {
                Some(t) => (t.to_browser.clone(), Arc::clone(&t.last_activity_ms)),
                None => return,
            }
        };
        last_activity.store(self.clock.epoch_ms(), Ordering::Relaxed);
        if to_browser.send(data).await.is_err() {
            warn!(%session_id, "browser channel closed, tearing down vnc tunnel");
            self.detach(session_id).await;
        }
    }

    /// Browser-side bytes bound for the agent, base64-wrapped into a
    /// `vnc_data` envelope per the agent link wire format.
    pub async fn send_from_browser(&self, session_id: &SessionId, data: Vec<u8>) -> SendOutcome {
        let (agent_id, last_activity) = {
            let tunnels = self.tunnels.lock();
            match tunnels.get(session_id) {
                Some(t) => (t.agent_id.clone(), Arc::clone(&t.last_activity_ms)),
                None => return SendOutcome::NoRoute,
            }
        };
        last_activity.store(self.clock.epoch_ms(), Ordering::Relaxed);
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        self.hub
            .send(&agent_id, HubMessage::VncData { session_id: session_id.clone(), data: encoded })
            .await
    }

    /// Agent tore its half down (link loss, port-forward failure). Removes
    /// the tunnel without re-sending `vnc_disconnect` back to the agent.
    pub async fn on_agent_disconnect(&self, session_id: &SessionId) {
        self.remove_tunnel(session_id);
    }

    /// Browser closed, or the idle reaper fired. Notifies the agent and
    /// removes the tunnel.
    pub async fn detach(&self, session_id: &SessionId) {
        let agent_id = self.tunnels.lock().get(session_id).map(|t| t.agent_id.clone());
        if let Some(agent_id) = agent_id {
            let _ = self.hub.send(&agent_id, HubMessage::VncDisconnect { session_id: session_id.clone() }).await;
        }
        self.remove_tunnel(session_id);
    }

    fn remove_tunnel(&self, session_id: &SessionId) {
        let removed = self.tunnels.lock().remove(session_id);
        if let Some(tunnel) = removed {
            let _ = self.store.apply(Event::TunnelClosed {
                tunnel_id: tunnel.tunnel_id,
                session_id: session_id.clone(),
                at_ms: self.clock.epoch_ms(),
            });
        }
    }

    pub fn has_tunnel(&self, session_id: &SessionId) -> bool {
        self.tunnels.lock().contains_key(session_id)
    }

    /// Link loss: drop every tunnel this agent held without re-sending
    /// `vnc_disconnect` (there is no link left to send it on).
    pub fn close_tunnels_for_agent(&self, agent_id: &AgentId) {
        let sessions: Vec<SessionId> = {
            let tunnels = self.tunnels.lock();
            tunnels.iter().filter(|(_, t)| &t.agent_id == agent_id).map(|(session_id, _)| session_id.clone()).collect()
        };
        for session_id in sessions {
            self.remove_tunnel(&session_id);
        }
    }
}
