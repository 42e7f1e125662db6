// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kh-storage: event-sourced persistence for the kiosk-hub control plane —
//! write-ahead log, periodic snapshots, and the materialized state they
//! reconstruct.

mod checkpoint;
mod snapshot;
mod state;
mod wal;

pub use checkpoint::{CheckpointError, Checkpointer};
pub use snapshot::{load_snapshot, Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::MaterializedState;
pub use wal::{Wal, WalEntry, WalError};
