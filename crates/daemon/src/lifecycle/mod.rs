// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Daemon lifecycle: startup (lock, recover, reconcile, wire up components)
//! and graceful shutdown (checkpoint, release the lock).

mod reconcile;
mod startup;

pub use reconcile::reconcile_stale;
pub use startup::{startup, StartupResult};

use crate::error::DaemonError;
use crate::AppState;
use tracing::{info, warn};

/// Checkpoints the store and drops the lock file, releasing the exclusive
/// lock. Call once, after the HTTP/link listeners have stopped accepting.
pub fn shutdown(state: &AppState, lock_file: std::fs::File) -> Result<(), DaemonError> {
    info!("kiosk-hub replica shutting down");
    if let Err(e) = state.store.checkpoint() {
        warn!("checkpoint on shutdown failed: {e}");
    }
    drop(lock_file);
    Ok(())
}
