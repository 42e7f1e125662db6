// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Startup reconciliation: the WAL/snapshot replay in `Store::open` only
//! rebuilds state as it was recorded. Anything that went stale while the
//! replica was down — a heartbeat TTL that lapsed, a command deadline that
//! passed — needs an explicit sweep before the replica starts serving.

use crate::error::DaemonError;
use crate::store::Store;
use kh_core::Clock as _;
use kh_core::{AgentStatus, CommandStatus, Event, SystemClock};
use tracing::info;

/// Marks agents whose last heartbeat is already older than `heartbeat_ttl`
/// as offline, and non-terminal commands already past `deadline_at` as
/// timed out. Both conditions can only have arisen while this replica was
/// not running to reap them live.
pub fn reconcile_stale(store: &Store, heartbeat_ttl_ms: u64) -> Result<(), DaemonError> {
    let now = SystemClock.epoch_ms();

    let stale_agents: Vec<_> = store.read(|s| {
        s.agents
            .values()
            .filter(|a| !a.deleted && a.status != AgentStatus::Offline)
            .filter(|a| now.saturating_sub(a.last_heartbeat_ms) >= heartbeat_ttl_ms)
            .map(|a| a.agent_id.clone())
            .collect()
    });
    for agent_id in stale_agents {
        info!(%agent_id, "reconcile: marking agent offline, heartbeat TTL lapsed while replica was down");
        store.apply(Event::AgentDisconnected { agent_id, replica_id: "reconcile".to_string(), at_ms: now })?;
    }

    let expired_commands: Vec<_> = store.read(|s| {
        s.commands.values().filter(|c| !c.status.is_terminal() && c.is_past_deadline(now)).map(|c| c.command_id).collect()
    });
    for command_id in expired_commands {
        info!(%command_id, "reconcile: reaping command to timeout, deadline passed while replica was down");
        store.apply(Event::CommandStatusChanged {
            command_id,
            status: CommandStatus::Timeout,
            result: None,
            error: Some("deadline exceeded while replica was offline".to_string()),
            at_ms: now,
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kh_core::{AgentId, Capacity, Platform};

    #[test]
    fn stale_heartbeat_is_marked_offline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("wal"), dir.path().join("snap")).expect("open");
        store
            .apply(Event::AgentRegistered {
                agent_id: AgentId::new("a1"),
                platform: Platform::Docker,
                region: "local".into(),
                capacity: Capacity { max_sessions: 1, cpu_millis: None, memory_mb: None },
                metadata: Default::default(),
                replica_id: "r1".into(),
                at_ms: 0,
            })
            .expect("apply");

        reconcile_stale(&store, 30_000).expect("reconcile");
        let status = store.read(|s| s.agents.get(&AgentId::new("a1")).map(|a| a.status));
        assert_eq!(status, Some(AgentStatus::Offline));
    }

    #[test]
    fn fresh_heartbeat_is_left_online() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("wal"), dir.path().join("snap")).expect("open");
        let now = SystemClock.epoch_ms();
        store
            .apply(Event::AgentRegistered {
                agent_id: AgentId::new("a1"),
                platform: Platform::Docker,
                region: "local".into(),
                capacity: Capacity { max_sessions: 1, cpu_millis: None, memory_mb: None },
                metadata: Default::default(),
                replica_id: "r1".into(),
                at_ms: now,
            })
            .expect("apply");

        reconcile_stale(&store, 30_000).expect("reconcile");
        let status = store.read(|s| s.agents.get(&AgentId::new("a1")).map(|a| a.status));
        assert_eq!(status, Some(AgentStatus::Online));
    }

    #[test]
    fn expired_command_is_reaped_to_timeout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("wal"), dir.path().join("snap")).expect("open");
        let command_id = kh_core::CommandId::new();
        store
            .apply(Event::CommandCreated {
                command_id,
                agent_id: AgentId::new("a1"),
                session_id: kh_core::SessionId::new("s1"),
                command_type: kh_core::CommandType::StartSession,
                payload: serde_json::json!({}),
                deadline_at_ms: 10,
                at_ms: 0,
            })
            .expect("apply");

        reconcile_stale(&store, 30_000).expect("reconcile");
        let status = store.read(|s| s.commands.get(&command_id).map(|c| c.status));
        assert_eq!(status, Some(CommandStatus::Timeout));
    }
}
