// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kh-elect: the Leader Elector (C2) — exactly one of a set of agent-runtime
//! replicas holds leadership at a time, per cluster.
//!
//! Three backends share one `LeaderElector` trait so `kh-agentrt` can swap
//! which one is wired up per deployment without touching call sites.

mod fslock;
mod k8s;
mod sharedlock;

pub use fslock::FileLockElector;
pub use k8s::ClusterLeaseElector;
pub use sharedlock::DistributedLockElector;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("shared store error: {0}")]
    Store(#[from] kh_sharedstore::StoreError),
    #[error("kubernetes API error: {0}")]
    Kube(String),
    #[error("elector already started")]
    AlreadyStarted,
}

/// Lease tuning. Defaults match the Kubernetes client-go leader-election
/// defaults: a follower has up to `lease_duration` to notice the holder is
/// gone, the holder renews well inside `renew_deadline`, and retries are
/// spaced by `retry_period`.
#[derive(Debug, Clone, Copy)]
pub struct LeaseConfig {
    pub lease_duration: Duration,
    pub renew_deadline: Duration,
    pub retry_period: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
        }
    }
}

/// Callbacks invoked as leadership changes. Totally ordered per instance:
/// `on_elected` precedes any `on_renew`, which precedes `on_lost`; `on_elected`
/// is never called twice in a row without an intervening `on_lost`.
pub struct ElectionCallbacks {
    pub on_elected: Box<dyn Fn() + Send + Sync>,
    pub on_renew: Box<dyn Fn() + Send + Sync>,
    pub on_lost: Box<dyn Fn() + Send + Sync>,
}

impl ElectionCallbacks {
    pub fn new(
        on_elected: impl Fn() + Send + Sync + 'static,
        on_renew: impl Fn() + Send + Sync + 'static,
        on_lost: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self { on_elected: Box::new(on_elected), on_renew: Box::new(on_renew), on_lost: Box::new(on_lost) }
    }
}

#[async_trait]
pub trait LeaderElector: Send + Sync {
    /// Begin campaigning for leadership under `identity`, invoking
    /// `callbacks` on every transition. Runs until `stop` is called; the
    /// campaign loop is spawned as a background task and this returns once
    /// it is running, not once leadership is won.
    async fn start(&self, identity: String, callbacks: ElectionCallbacks) -> Result<(), ElectError>;

    fn is_leader(&self) -> bool;

    async fn stop(&self);
}
