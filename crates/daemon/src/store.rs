// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Durable materialized state: every mutation is appended to the WAL,
//! fsynced, then applied in-memory — in that order, under one lock, so the
//! two never disagree about what has been made durable.

use crate::error::DaemonError;
use kh_core::Event;
use kh_storage::{Checkpointer, MaterializedState, Wal};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::info;

struct Inner {
    wal: Wal,
    state: MaterializedState,
    seq: u64,
}

pub struct Store {
    inner: Mutex<Inner>,
    wal_path: PathBuf,
    snapshot_path: PathBuf,
}

impl Store {
    /// Loads the latest snapshot (if any), replays WAL entries after it, and
    /// opens the WAL for further appends at the resulting sequence.
    pub fn open(wal_path: impl Into<PathBuf>, snapshot_path: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let wal_path = wal_path.into();
        let snapshot_path = snapshot_path.into();

        let (mut state, seq) = match kh_storage::load_snapshot(&snapshot_path)? {
            Some(snapshot) => {
                info!(seq = snapshot.seq, agents = snapshot.state.agents.len(), "loaded snapshot");
                (snapshot.state, snapshot.seq)
            }
            None => {
                info!("no snapshot found, starting with empty state");
                (MaterializedState::default(), 0)
            }
        };

        let wal = Wal::open(&wal_path, seq)?;
        let replay = wal.entries_after(seq)?;
        let mut last_seq = seq;
        for entry in &replay {
            state.apply_event(&entry.event);
            last_seq = entry.seq;
        }
        if !replay.is_empty() {
            info!(count = replay.len(), "replayed WAL entries after snapshot");
        }

        Ok(Self { inner: Mutex::new(Inner { wal, state, seq: last_seq }), wal_path, snapshot_path })
    }

    /// Appends `event` to the WAL, fsyncs, then applies it to the in-memory
    /// projection. Returns once both have happened.
    pub fn apply(&self, event: Event) -> Result<(), DaemonError> {
        let mut inner = self.inner.lock();
        let entry = inner.wal.append(event)?;
        inner.wal.flush()?;
        inner.seq = entry.seq;
        inner.state.apply_event(&entry.event);
        Ok(())
    }

    pub fn read<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        f(&self.inner.lock().state)
    }

    pub fn snapshot_state(&self) -> MaterializedState {
        self.inner.lock().state.clone()
    }

    pub fn checkpoint(&self) -> Result<(), DaemonError> {
        let checkpointer = Checkpointer::new(&self.snapshot_path, &self.wal_path);
        let inner = self.inner.lock();
        checkpointer.checkpoint(inner.seq, &inner.state)?;
        Ok(())
    }

    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kh_core::{AgentId, Capacity, Platform};

    fn registered(agent_id: &str) -> Event {
        Event::AgentRegistered {
            agent_id: AgentId::new(agent_id),
            platform: Platform::Docker,
            region: "local".into(),
            capacity: Capacity { max_sessions: 4, cpu_millis: None, memory_mb: None },
            metadata: Default::default(),
            replica_id: "r1".into(),
            at_ms: 0,
        }
    }

    #[test]
    fn apply_persists_and_reopen_recovers_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wal_path = dir.path().join("wal.jsonl");
        let snapshot_path = dir.path().join("state.snap");

        {
            let store = Store::open(&wal_path, &snapshot_path).expect("open");
            store.apply(registered("a1")).expect("apply");
        }

        let store = Store::open(&wal_path, &snapshot_path).expect("reopen");
        assert_eq!(store.read(|s| s.agents.len()), 1);
    }

    #[test]
    fn checkpoint_truncates_wal_but_preserves_state_on_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wal_path = dir.path().join("wal.jsonl");
        let snapshot_path = dir.path().join("state.snap");

        let store = Store::open(&wal_path, &snapshot_path).expect("open");
        store.apply(registered("a1")).expect("apply");
        store.checkpoint().expect("checkpoint");
        assert!(!wal_path.exists());

        let reopened = Store::open(&wal_path, &snapshot_path).expect("reopen");
        assert_eq!(reopened.read(|s| s.agents.len()), 1);
    }
}
