// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Internal daemon errors — startup, persistence, and elector wiring.
//! HTTP-boundary errors are `kh_wire::ApiError`, mapped to responses in
//! `http::respond`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("could not determine or create state directory: {0}")]
    StateDir(#[source] std::io::Error),

    #[error("failed to acquire lock at {0}: daemon already running?")]
    LockFailed(PathBuf, #[source] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("WAL error: {0}")]
    Wal(#[from] kh_storage::WalError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] kh_storage::SnapshotError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] kh_storage::CheckpointError),

    #[error("shared store error: {0}")]
    Store(#[from] kh_sharedstore::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
