// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Wires the configured `kh-elect` backend (§4.2) into this process. Only
//! the leader services commands; followers still hold their link open and
//! answer heartbeats (§4.7) but advertise `status=draining`-equivalent
//! follower metadata via the `is_leader` flag the caller polls.

use crate::config::{Config, ElectionBackend};
use kh_elect::{
    ClusterLeaseElector, DistributedLockElector, ElectError, ElectionCallbacks, FileLockElector, LeaderElector, LeaseConfig,
};
use kh_sharedstore::{LocalStore, RedisStore, SharedStore};
use std::sync::Arc;

pub async fn build_elector(config: &Config) -> Result<Arc<dyn LeaderElector>, ElectError> {
    match config.election_backend {
        ElectionBackend::FileLock => Ok(Arc::new(FileLockElector::new(config.election_lock_path(), LeaseConfig::default()))),
        ElectionBackend::DistributedLock => {
            let store: Arc<dyn SharedStore> = match &config.redis_url {
                Some(url) => {
                    let redis_config = fred::types::config::Config::from_url(url)
                        .map_err(|e| ElectError::Store(kh_sharedstore::StoreError::Protocol(e.to_string())))?;
                    Arc::new(RedisStore::connect(redis_config).await.map_err(ElectError::Store)?)
                }
                None => Arc::new(LocalStore::new()),
            };
            Ok(Arc::new(DistributedLockElector::new(store, "kiosk-hub/agentrt-leader", LeaseConfig::default())))
        }
        ElectionBackend::ClusterLease => {
            let client = kube::Client::try_default().await.map_err(|e| ElectError::Kube(e.to_string()))?;
            Ok(Arc::new(ClusterLeaseElector::new(client, config.k8s_namespace.clone(), config.k8s_lease_name.clone(), LeaseConfig::default())))
        }
    }
}

pub fn callbacks(
    on_elected: impl Fn() + Send + Sync + 'static,
    on_renew: impl Fn() + Send + Sync + 'static,
    on_lost: impl Fn() + Send + Sync + 'static,
) -> ElectionCallbacks {
    ElectionCallbacks::new(on_elected, on_renew, on_lost)
}
