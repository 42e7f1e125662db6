// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Periodic snapshot + WAL truncation.
//!
//! Taking a checkpoint is the only thing that lets the WAL be replaced by a
//! fresh, empty file — until then it grows without bound.

use crate::snapshot::{load_snapshot, Snapshot, SnapshotError};
use crate::state::MaterializedState;
use chrono::Utc;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Checkpointer {
    snapshot_path: PathBuf,
    wal_path: PathBuf,
}

impl Checkpointer {
    pub fn new(snapshot_path: impl Into<PathBuf>, wal_path: impl Into<PathBuf>) -> Self {
        Self { snapshot_path: snapshot_path.into(), wal_path: wal_path.into() }
    }

    /// Write `state` as of `seq`, then truncate the WAL — entries up to and
    /// including `seq` are now redundant with the snapshot.
    pub fn checkpoint(&self, seq: u64, state: &MaterializedState) -> Result<(), CheckpointError> {
        Snapshot::new(seq, state.clone(), Utc::now()).save(&self.snapshot_path)?;
        if self.wal_path.exists() {
            std::fs::remove_file(&self.wal_path)?;
        }
        Ok(())
    }

    pub fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        load_snapshot(&self.snapshot_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kh_core::{AgentId, Capacity, Event, Platform};

    #[test]
    fn checkpoint_truncates_wal_and_preserves_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let snapshot_path = dir.path().join("state.snap");
        let wal_path = dir.path().join("wal.jsonl");
        std::fs::write(&wal_path, b"stale\n").expect("seed wal");

        let mut state = MaterializedState::default();
        state.apply_event(&Event::AgentRegistered {
            agent_id: AgentId::new("a1"),
            platform: Platform::Docker,
            region: "local".into(),
            capacity: Capacity { max_sessions: 2, cpu_millis: None, memory_mb: None },
            metadata: Default::default(),
            replica_id: "r1".into(),
            at_ms: 0,
        });

        let checkpointer = Checkpointer::new(&snapshot_path, &wal_path);
        checkpointer.checkpoint(5, &state).expect("checkpoint");

        assert!(!wal_path.exists());
        let loaded = checkpointer.load().expect("load").expect("present");
        assert_eq!(loaded.seq, 5);
        assert_eq!(loaded.state.agents.len(), 1);
    }
}
