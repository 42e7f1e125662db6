// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Snapshot persistence for crash recovery.
//!
//! Snapshots store the complete materialized state at a point in time,
//! identified by the WAL sequence number. Recovery loads the snapshot and
//! replays WAL entries after that sequence. Snapshot bytes are zstd-compressed
//! on disk; the in-memory `Snapshot` is always plain JSON-shaped.

use crate::state::MaterializedState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("compression error: {0}")]
    Compression(std::io::Error),
    #[error("unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "v")]
    pub version: u32,
    pub seq: u64,
    pub state: MaterializedState,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(seq: u64, state: MaterializedState, created_at: DateTime<Utc>) -> Self {
        Self { version: CURRENT_SNAPSHOT_VERSION, seq, state, created_at }
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(self)?;
        let compressed = zstd::encode_all(json.as_slice(), 0).map_err(SnapshotError::Compression)?;
        if path.exists() {
            let _ = fs::rename(path, rotate_bak_path(path));
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, compressed)?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }
    let compressed = fs::read(path)?;
    let json = zstd::decode_all(compressed.as_slice()).map_err(SnapshotError::Compression)?;
    let snapshot: Snapshot = serde_json::from_slice(&json)?;
    if snapshot.version != CURRENT_SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: snapshot.version,
            expected: CURRENT_SNAPSHOT_VERSION,
        });
    }
    Ok(Some(snapshot))
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snapshot.bin");
        let mut state = MaterializedState::default();
        state.apply_event(&kh_core::Event::AgentRegistered {
            agent_id: kh_core::AgentId::new("a1"),
            platform: kh_core::Platform::Docker,
            region: "local".into(),
            capacity: kh_core::Capacity { max_sessions: 4, cpu_millis: None, memory_mb: None },
            metadata: Default::default(),
            replica_id: "r1".into(),
            at_ms: 0,
        });
        let snapshot = Snapshot::new(7, state, Utc::now());
        snapshot.save(&path).expect("save");

        let loaded = load_snapshot(&path).expect("load").expect("present");
        assert_eq!(loaded.seq, 7);
        assert_eq!(loaded.state.agents.len(), 1);
    }

    #[test]
    fn load_missing_path_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.bin");
        assert!(load_snapshot(&path).expect("load").is_none());
    }

    #[test]
    fn saving_twice_rotates_previous_into_bak() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snapshot.bin");
        Snapshot::new(1, MaterializedState::default(), Utc::now()).save(&path).expect("save 1");
        Snapshot::new(2, MaterializedState::default(), Utc::now()).save(&path).expect("save 2");
        assert!(path.with_extension("bak").exists());
        let loaded = load_snapshot(&path).expect("load").expect("present");
        assert_eq!(loaded.seq, 2);
    }
}
