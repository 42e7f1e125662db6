// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kh-sharedstore: the Shared State Store (C1) — a process-external
//! key/value abstraction with TTL, pub/sub, and compare-and-set, backing
//! cross-replica agent routing (§4.1).
//!
//! Only eventual consistency is assumed: the registry this backs is
//! advisory and re-derivable from live links, so a transient failure here
//! degrades the caller to local-only routing rather than becoming fatal.

mod local;
mod redis;

pub use local::LocalStore;
pub use redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend returned an unexpected response: {0}")]
    Protocol(String),
}

/// Outcome of a lock-style write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Ok,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    Occupied,
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// `SET key value NX` semantics: succeeds only if `key` was absent.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<AcquireOutcome, StoreError>;

    /// Replace `key`'s value with `new` only if it currently equals `expected`.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<CasOutcome, StoreError>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Best-effort subscription: a dropped publish never corrupts state,
    /// since C5/C2 treat their own persisted state as ground truth.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, StoreError>;

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
#[path = "contract_tests.rs"]
mod contract_tests;
