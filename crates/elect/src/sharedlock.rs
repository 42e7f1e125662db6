// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Multi-host elector backed by the Shared State Store's CAS primitives
//! (C1). Used when a cluster has agent-runtime replicas on more than one
//! host but no Kubernetes API to hold a `Lease` against.

use crate::{ElectError, ElectionCallbacks, LeaderElector, LeaseConfig};
use async_trait::async_trait;
use kh_sharedstore::{AcquireOutcome, CasOutcome, SharedStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct DistributedLockElector {
    store: Arc<dyn SharedStore>,
    key: String,
    lease: LeaseConfig,
    is_leader: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl DistributedLockElector {
    pub fn new(store: Arc<dyn SharedStore>, key: impl Into<String>, lease: LeaseConfig) -> Self {
        Self {
            store,
            key: key.into(),
            lease,
            is_leader: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl LeaderElector for DistributedLockElector {
    async fn start(
        &self,
        identity: String,
        callbacks: ElectionCallbacks,
    ) -> Result<(), ElectError> {
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let lease = self.lease;
        let is_leader = Arc::clone(&self.is_leader);
        let stopped = Arc::clone(&self.stopped);

        tokio::spawn(async move {
            let mut last_renewed_at: Option<Instant> = None;

            loop {
                if stopped.load(Ordering::Acquire) {
                    return;
                }

                if is_leader.load(Ordering::Acquire) {
                    match store
                        .compare_and_set(&key, &identity, &identity, Some(lease.lease_duration))
                        .await
                    {
                        Ok(CasOutcome::Ok) => {
                            last_renewed_at = Some(Instant::now());
                            (callbacks.on_renew)();
                        }
                        Ok(CasOutcome::Conflict) => {
                            is_leader.store(false, Ordering::Release);
                            last_renewed_at = None;
                            warn!(identity = %identity, "lost distributed-lock leadership on renew");
                            (callbacks.on_lost)();
                        }
                        Err(e) => {
                            warn!("renew attempt failed: {e}");
                            let expired = last_renewed_at.is_some_and(|t| t.elapsed() >= lease.renew_deadline);
                            if expired && is_leader.swap(false, Ordering::AcqRel) {
                                last_renewed_at = None;
                                warn!(identity = %identity, "renew deadline exceeded, self-demoting");
                                (callbacks.on_lost)();
                            }
                        }
                    }
                } else {
                    match store.set_if_absent(&key, &identity, Some(lease.lease_duration)).await {
                        Ok(AcquireOutcome::Acquired) => {
                            is_leader.store(true, Ordering::Release);
                            last_renewed_at = Some(Instant::now());
                            info!(identity = %identity, "acquired distributed-lock leadership");
                            (callbacks.on_elected)();
                        }
                        Ok(AcquireOutcome::Occupied) => {}
                        Err(e) => warn!("acquire attempt failed: {e}"),
                    }
                }

                tokio::time::sleep(lease.retry_period).await;
            }
        });

        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if self.is_leader.swap(false, Ordering::AcqRel) {
            let _ = self.store.delete(&self.key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kh_sharedstore::LocalStore;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn single_candidate_acquires_and_renews() {
        let store: Arc<dyn SharedStore> = Arc::new(LocalStore::new());
        let lease = LeaseConfig {
            lease_duration: Duration::from_millis(200),
            renew_deadline: Duration::from_millis(100),
            retry_period: Duration::from_millis(20),
        };
        let elector = DistributedLockElector::new(Arc::clone(&store), "cluster:leader", lease);

        let elected = Arc::new(AtomicUsize::new(0));
        let elected_clone = Arc::clone(&elected);
        elector
            .start("r1".into(), ElectionCallbacks::new(move || { elected_clone.fetch_add(1, Ordering::SeqCst); }, || {}, || {}))
            .await
            .expect("start");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(elector.is_leader());
        assert_eq!(elected.load(Ordering::SeqCst), 1);
        elector.stop().await;
    }

    #[tokio::test]
    async fn second_candidate_stays_follower_while_first_holds_lease() {
        let store: Arc<dyn SharedStore> = Arc::new(LocalStore::new());
        let lease = LeaseConfig {
            lease_duration: Duration::from_secs(10),
            renew_deadline: Duration::from_secs(5),
            retry_period: Duration::from_millis(20),
        };

        let first = DistributedLockElector::new(Arc::clone(&store), "cluster:leader", lease);
        first.start("r1".into(), ElectionCallbacks::new(|| {}, || {}, || {})).await.expect("start");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(first.is_leader());

        let second = DistributedLockElector::new(Arc::clone(&store), "cluster:leader", lease);
        second.start("r2".into(), ElectionCallbacks::new(|| {}, || {}, || {})).await.expect("start");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!second.is_leader());

        first.stop().await;
        second.stop().await;
    }
}
