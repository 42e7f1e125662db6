// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! In-memory `SharedStore` for single-replica deployments and tests.

use crate::{AcquireOutcome, CasOutcome, SharedStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// `parking_lot::Mutex`-guarded maps, with one broadcast channel per
/// channel name ever subscribed to. Lock scopes are kept to single
/// map operations; nothing here awaits while holding the lock.
#[derive(Default)]
pub struct LocalStore {
    values: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_live(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut values = self.values.lock();
        let live = values.get(key).map(|e| e.is_live(now)).unwrap_or(false);
        if !live {
            values.remove(key);
            return None;
        }
        values.get(key).map(|e| e.value.clone())
    }
}

#[async_trait]
impl SharedStore for LocalStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.values.lock().insert(key.to_string(), Entry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_live(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().remove(key);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<AcquireOutcome, StoreError> {
        if self.get_live(key).is_some() {
            return Ok(AcquireOutcome::Occupied);
        }
        let expires_at = ttl.map(|d| Instant::now() + d);
        let mut values = self.values.lock();
        let now = Instant::now();
        let still_absent = values.get(key).map(|e| !e.is_live(now)).unwrap_or(true);
        if !still_absent {
            return Ok(AcquireOutcome::Occupied);
        }
        values.insert(key.to_string(), Entry { value: value.to_string(), expires_at });
        Ok(AcquireOutcome::Acquired)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<CasOutcome, StoreError> {
        let mut values = self.values.lock();
        let now = Instant::now();
        let current = values.get(key).filter(|e| e.is_live(now)).map(|e| e.value.as_str());
        if current != Some(expected) {
            return Ok(CasOutcome::Conflict);
        }
        let expires_at = ttl.map(|d| Instant::now() + d);
        values.insert(key.to_string(), Entry { value: new.to_string(), expires_at });
        Ok(CasOutcome::Ok)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let sender = self.channels.lock().get(channel).cloned();
        if let Some(sender) = sender {
            // No subscribers is not an error: publish is fire-and-forget.
            let _ = sender.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, StoreError> {
        let mut broadcast_rx = {
            let mut channels = self.channels.lock();
            let sender = channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(256).0);
            sender.subscribe()
        };
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let values = self.values.lock();
        Ok(values
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
