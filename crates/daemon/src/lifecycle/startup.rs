// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Replica startup: acquire the exclusive lock for this state directory,
//! recover the WAL/snapshot, reconcile staleness, then wire up the shared
//! store, Agent Hub, Command Dispatcher, and VNC Proxy.

use crate::config::{Config, SharedStoreMode};
use crate::dispatcher::CommandDispatcher;
use crate::error::DaemonError;
use crate::hub::AgentHub;
use crate::store::Store;
use crate::vnc::TunnelManager;
use crate::AppState;
use fs2::FileExt;
use kh_core::{ReplicaId, SystemClock};
use kh_sharedstore::{LocalStore, RedisStore, SharedStore, StoreError};
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::reconcile::reconcile_stale;

pub struct StartupResult {
    pub state: Arc<AppState>,
    /// Held for the process lifetime; releases the exclusive lock on drop.
    pub lock_file: File,
}

pub async fn startup(config: Config) -> Result<StartupResult, DaemonError> {
    std::fs::create_dir_all(&config.state_dir).map_err(DaemonError::StateDir)?;

    let lock_path = config.lock_path();
    let lock_file =
        std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&lock_path)?;
    lock_file.try_lock_exclusive().map_err(|e| DaemonError::LockFailed(lock_path.clone(), e))?;

    let store = Arc::new(Store::open(config.wal_path(), config.snapshot_path())?);
    reconcile_stale(&store, config.heartbeat_ttl().as_millis() as u64)?;

    let shared = build_shared_store(&config).await?;

    let clock = SystemClock;
    let replica_id = ReplicaId::new(config.replica_identity.clone());
    let heartbeat_ttl = config.heartbeat_ttl();

    let hub = AgentHub::spawn(Arc::clone(&store), shared, replica_id, heartbeat_ttl, clock);
    let dispatcher = CommandDispatcher::spawn(
        Arc::clone(&store),
        Arc::clone(&hub),
        clock,
        config.dispatcher.workers,
        config.dispatcher_default_timeout(),
    );
    let vnc = TunnelManager::spawn(
        Arc::clone(&store),
        Arc::clone(&hub),
        Arc::clone(&dispatcher),
        clock,
        config.vnc.on_double_attach,
        Duration::from_secs(config.vnc.idle_timeout_secs),
    );

    spawn_checkpoint_loop(Arc::clone(&store));

    info!(replica_identity = %config.replica_identity, "kiosk-hub replica started");

    Ok(StartupResult { state: Arc::new(AppState { config: Arc::new(config), store, hub, dispatcher, vnc }), lock_file })
}

async fn build_shared_store(config: &Config) -> Result<Arc<dyn SharedStore>, DaemonError> {
    match config.shared_store_mode {
        SharedStoreMode::None => Ok(Arc::new(LocalStore::new())),
        SharedStoreMode::Distributed => {
            let url = config.redis_url.clone().ok_or_else(|| {
                DaemonError::Store(StoreError::Protocol("shared_store_mode=distributed requires redis_url".into()))
            })?;
            let redis_config = fred::types::RedisConfig::from_url(&url)
                .map_err(|e| DaemonError::Store(StoreError::Protocol(e.to_string())))?;
            Ok(Arc::new(RedisStore::connect(redis_config).await?))
        }
    }
}

fn spawn_checkpoint_loop(store: Arc<Store>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(300)).await;
            if let Err(e) = store.checkpoint() {
                warn!("periodic checkpoint failed: {e}");
            }
        }
    });
}
