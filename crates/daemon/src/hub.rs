// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Agent Hub (C4): the per-replica registry mapping `agent_id` to a local
//! link or a peer replica, and the single send path every other component
//! routes an agent-bound message through.

use crate::error::DaemonError;
use crate::store::Store;
use kh_core::{Agent, AgentId, Capacity, Clock, Event, Platform, ReplicaId};
use kh_sharedstore::SharedStore;
use kh_wire::HubMessage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    NoRoute,
    AgentOffline,
}

#[derive(Serialize, Deserialize)]
struct RoutedEnvelope {
    agent_id: AgentId,
    message: HubMessage,
}

pub struct AgentHub<C: Clock> {
    store: Arc<Store>,
    shared: Arc<dyn SharedStore>,
    replica_id: ReplicaId,
    heartbeat_ttl: Duration,
    clock: C,
    links: Mutex<HashMap<AgentId, mpsc::Sender<HubMessage>>>,
}

impl<C: Clock + 'static> AgentHub<C> {
    /// Builds the hub and spawns the background task draining this
    /// replica's inbox channel (messages peers routed here for agents we
    /// hold a local link for).
    pub fn spawn(
        store: Arc<Store>,
        shared: Arc<dyn SharedStore>,
        replica_id: ReplicaId,
        heartbeat_ttl: Duration,
        clock: C,
    ) -> Arc<Self> {
        let hub = Arc::new(Self {
            store,
            shared,
            replica_id,
            heartbeat_ttl,
            clock,
            links: Mutex::new(HashMap::new()),
        });

        let hub_for_inbox = Arc::clone(&hub);
        tokio::spawn(async move { hub_for_inbox.drain_inbox().await });

        hub
    }

    async fn drain_inbox(self: Arc<Self>) {
        let channel = self.replica_id.inbox_channel();
        let mut rx = match self.shared.subscribe(&channel).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("failed to subscribe to inbox channel {channel}: {e}");
                return;
            }
        };
        while let Some(payload) = rx.recv().await {
            let Ok(envelope) = serde_json::from_str::<RoutedEnvelope>(&payload) else {
                warn!("dropped malformed inbox envelope on {channel}");
                continue;
            };
            let local = self.links.lock().get(&envelope.agent_id).cloned();
            if let Some(tx) = local {
                if tx.send(envelope.message).await.is_err() {
                    warn!(agent_id = %envelope.agent_id, "inbox delivery to local link failed");
                }
            }
        }
    }

    /// Registers a new local link, closing any prior one for this
    /// `agent_id` first (§4.4 invariant: a link supersedes its predecessor).
    pub async fn on_agent_registered(
        &self,
        agent_id: AgentId,
        platform: Platform,
        region: String,
        capacity: Capacity,
        metadata: HashMap<String, String>,
        link_tx: mpsc::Sender<HubMessage>,
    ) -> Result<(), DaemonError> {
        if let Some(old) = self.links.lock().insert(agent_id.clone(), link_tx) {
            drop(old);
        }

        let now = self.clock.epoch_ms();
        let _ = self
            .shared
            .set(&ReplicaId::pod_key(agent_id.as_str()), self.replica_id.as_str(), Some(self.heartbeat_ttl))
            .await;
        let _ = self
            .shared
            .set(&ReplicaId::heartbeat_key(agent_id.as_str()), &now.to_string(), Some(self.heartbeat_ttl))
            .await;

        self.store.apply(Event::AgentRegistered {
            agent_id: agent_id.clone(),
            platform,
            region,
            capacity,
            metadata,
            replica_id: self.replica_id.to_string(),
            at_ms: now,
        })?;
        info!(agent_id = %agent_id, %platform, "agent registered");
        Ok(())
    }

    /// Tears down the local link, but only if `link_tx` is still the one
    /// registered for `agent_id` — a superseding `on_agent_registered` call
    /// (same replica, reconnected agent) already replaced the map entry with
    /// a live sender, and a disconnect from the old socket racing behind it
    /// must not rip that new link out. Only clears the shared routing key if
    /// it still names this replica — a newer registration elsewhere wins the
    /// race rather than being clobbered by a stale disconnect.
    pub async fn on_agent_disconnected(&self, agent_id: &AgentId, link_tx: &mpsc::Sender<HubMessage>) -> Result<(), DaemonError> {
        let still_current = {
            let mut links = self.links.lock();
            match links.get(agent_id) {
                Some(current) if current.same_channel(link_tx) => {
                    links.remove(agent_id);
                    true
                }
                _ => false,
            }
        };
        if !still_current {
            return Ok(());
        }

        let pod_key = ReplicaId::pod_key(agent_id.as_str());
        if let Ok(Some(owner)) = self.shared.get(&pod_key).await {
            if owner == self.replica_id.as_str() {
                let _ = self.shared.delete(&pod_key).await;
            }
        }

        let now = self.clock.epoch_ms();
        self.store.apply(Event::AgentDisconnected {
            agent_id: agent_id.clone(),
            replica_id: self.replica_id.to_string(),
            at_ms: now,
        })?;
        info!(agent_id = %agent_id, "agent disconnected");
        Ok(())
    }

    /// Delivers to a local link if one exists; otherwise resolves the
    /// owning replica from the shared store and publishes to its inbox.
    /// Publication success is the best confirmation available — actual
    /// agent-side delivery is confirmed later by `ack`/`complete`.
    pub async fn send(&self, agent_id: &AgentId, message: HubMessage) -> SendOutcome {
        let local = self.links.lock().get(agent_id).cloned();
        if let Some(tx) = local {
            return if tx.send(message).await.is_ok() { SendOutcome::Delivered } else { SendOutcome::AgentOffline };
        }

        match self.shared.get(&ReplicaId::pod_key(agent_id.as_str())).await {
            Ok(Some(owner)) => {
                let envelope = RoutedEnvelope { agent_id: agent_id.clone(), message };
                let Ok(payload) = serde_json::to_string(&envelope) else { return SendOutcome::NoRoute };
                match self.shared.publish(&ReplicaId::new(owner).inbox_channel(), &payload).await {
                    Ok(()) => SendOutcome::Delivered,
                    Err(_) => SendOutcome::NoRoute,
                }
            }
            Ok(None) => SendOutcome::NoRoute,
            Err(e) => {
                warn!("shared store unreachable, degrading to local-only routing: {e}");
                SendOutcome::NoRoute
            }
        }
    }

    pub async fn broadcast(&self, message: HubMessage) {
        let agent_ids: Vec<AgentId> = self.links.lock().keys().cloned().collect();
        for agent_id in agent_ids {
            let _ = self.send(&agent_id, message.clone()).await;
        }
    }

    pub async fn refresh_heartbeat(&self, agent_id: &AgentId) -> Result<(), DaemonError> {
        let now = self.clock.epoch_ms();
        let _ = self
            .shared
            .set(&ReplicaId::pod_key(agent_id.as_str()), self.replica_id.as_str(), Some(self.heartbeat_ttl))
            .await;
        let _ = self
            .shared
            .set(&ReplicaId::heartbeat_key(agent_id.as_str()), &now.to_string(), Some(self.heartbeat_ttl))
            .await;
        self.store.apply(Event::AgentHeartbeat {
            agent_id: agent_id.clone(),
            replica_id: self.replica_id.to_string(),
            at_ms: now,
        })?;
        Ok(())
    }

    pub fn list_online(&self, platform: Option<Platform>, region: Option<&str>) -> Vec<Agent> {
        self.store.read(|s| s.agents_online(platform, region).into_iter().cloned().collect())
    }

    pub fn has_local_link(&self, agent_id: &AgentId) -> bool {
        self.links.lock().contains_key(agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kh_core::FakeClock;
    use kh_sharedstore::LocalStore;

    fn hub() -> Arc<AgentHub<FakeClock>> {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(Store::open(dir.path().join("wal"), dir.path().join("snap")).expect("open"));
        let shared: Arc<dyn SharedStore> = Arc::new(LocalStore::new());
        AgentHub::spawn(store, shared, ReplicaId::new("r1"), Duration::from_secs(30), FakeClock::new())
    }

    #[tokio::test]
    async fn send_to_unregistered_agent_is_no_route() {
        let hub = hub();
        let outcome = hub.send(&AgentId::new("a1"), HubMessage::Shutdown).await;
        assert_eq!(outcome, SendOutcome::NoRoute);
    }

    #[tokio::test]
    async fn send_to_local_link_delivers() {
        let hub = hub();
        let (tx, mut rx) = mpsc::channel(4);
        hub.on_agent_registered(
            AgentId::new("a1"),
            Platform::Docker,
            "local".into(),
            Capacity { max_sessions: 2, cpu_millis: None, memory_mb: None },
            HashMap::new(),
            tx,
        )
        .await
        .expect("register");

        let outcome = hub.send(&AgentId::new("a1"), HubMessage::Shutdown).await;
        assert_eq!(outcome, SendOutcome::Delivered);
        assert!(matches!(rx.recv().await, Some(HubMessage::Shutdown)));
    }

    #[tokio::test]
    async fn disconnect_clears_routing_and_future_sends_no_route() {
        let hub = hub();
        let (tx, _rx) = mpsc::channel(4);
        let tx_for_disconnect = tx.clone();
        hub.on_agent_registered(
            AgentId::new("a1"),
            Platform::Docker,
            "local".into(),
            Capacity { max_sessions: 2, cpu_millis: None, memory_mb: None },
            HashMap::new(),
            tx,
        )
        .await
        .expect("register");

        hub.on_agent_disconnected(&AgentId::new("a1"), &tx_for_disconnect).await.expect("disconnect");
        let outcome = hub.send(&AgentId::new("a1"), HubMessage::Shutdown).await;
        assert_eq!(outcome, SendOutcome::NoRoute);
    }

    #[tokio::test]
    async fn disconnect_from_superseded_link_does_not_tear_down_new_one() {
        let hub = hub();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        hub.on_agent_registered(
            AgentId::new("a1"),
            Platform::Docker,
            "local".into(),
            Capacity { max_sessions: 2, cpu_millis: None, memory_mb: None },
            HashMap::new(),
            tx1.clone(),
        )
        .await
        .expect("first register");
        hub.on_agent_registered(
            AgentId::new("a1"),
            Platform::Docker,
            "local".into(),
            Capacity { max_sessions: 2, cpu_millis: None, memory_mb: None },
            HashMap::new(),
            tx2,
        )
        .await
        .expect("second register");

        // A disconnect for the superseded link must not remove the new one.
        hub.on_agent_disconnected(&AgentId::new("a1"), &tx1).await.expect("stale disconnect");

        let outcome = hub.send(&AgentId::new("a1"), HubMessage::Shutdown).await;
        assert_eq!(outcome, SendOutcome::Delivered);
        assert!(matches!(rx2.recv().await, Some(HubMessage::Shutdown)));
    }

    #[tokio::test]
    async fn re_registration_supersedes_prior_local_link() {
        let hub = hub();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let register = |tx| {
            hub.on_agent_registered(
                AgentId::new("a1"),
                Platform::Docker,
                "local".into(),
                Capacity { max_sessions: 2, cpu_millis: None, memory_mb: None },
                HashMap::new(),
                tx,
            )
        };
        register(tx1).await.expect("first register");
        register(tx2).await.expect("second register");

        hub.send(&AgentId::new("a1"), HubMessage::Shutdown).await;
        assert!(matches!(rx2.recv().await, Some(HubMessage::Shutdown)));
    }

    #[tokio::test]
    async fn list_online_reflects_registered_agent() {
        let hub = hub();
        let (tx, _rx) = mpsc::channel(4);
        hub.on_agent_registered(
            AgentId::new("a1"),
            Platform::Kubernetes,
            "us-east".into(),
            Capacity { max_sessions: 2, cpu_millis: None, memory_mb: None },
            HashMap::new(),
            tx,
        )
        .await
        .expect("register");

        let online = hub.list_online(Some(Platform::Kubernetes), None);
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].agent_id, AgentId::new("a1"));
    }
}
