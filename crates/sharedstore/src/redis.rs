// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! `fred`-backed `SharedStore` for multi-replica (HA) deployments.

use crate::{AcquireOutcome, CasOutcome, SharedStore, StoreError};
use async_trait::async_trait;
use fred::clients::{Client, SubscriberClient};
use fred::interfaces::{ClientLike, EventInterface, KeysInterface, LuaInterface, PubsubInterface};
use fred::types::config::Config;
use fred::types::{Expiration, SetOptions};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;

// Redis has no native compare-and-set; this script makes the read-compare-write
// atomic on the server. KEYS[1] = key, ARGV[1] = expected, ARGV[2] = new,
// ARGV[3] = ttl millis ("0" for none).
const COMPARE_AND_SET_SCRIPT: &str = r#"
local current = redis.call("GET", KEYS[1])
if current ~= ARGV[1] then
  return 0
end
if ARGV[3] == "0" then
  redis.call("SET", KEYS[1], ARGV[2])
else
  redis.call("SET", KEYS[1], ARGV[2], "PX", ARGV[3])
end
return 1
"#;

pub struct RedisStore {
    client: Client,
    subscriber: SubscriberClient,
}

impl RedisStore {
    /// Connects both the command client and the dedicated subscriber client
    /// `fred` requires for pub/sub, and waits for both to be ready.
    pub async fn connect(config: Config) -> Result<Self, StoreError> {
        let client = Client::new(config.clone(), None, None, None);
        let subscriber = SubscriberClient::new(config, None, None, None);

        client.init().await.map_err(to_store_error)?;
        subscriber.init().await.map_err(to_store_error)?;

        Ok(Self { client, subscriber })
    }

    fn ttl_millis(ttl: Option<Duration>) -> i64 {
        ttl.map(|d| d.as_millis() as i64).unwrap_or(0)
    }
}

fn to_store_error(err: fred::error::Error) -> StoreError {
    StoreError::Unreachable(err.to_string())
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expire = ttl.map(|d| Expiration::PX(d.as_millis() as i64));
        self.client
            .set::<(), _, _>(key, value, expire, None, false)
            .await
            .map_err(to_store_error)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.client.get(key).await.map_err(to_store_error)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client.del::<(), _>(key).await.map_err(to_store_error)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<AcquireOutcome, StoreError> {
        let expire = ttl.map(|d| Expiration::PX(d.as_millis() as i64));
        let set: Option<String> = self
            .client
            .set(key, value, expire, Some(SetOptions::NX), true)
            .await
            .map_err(to_store_error)?;
        Ok(if set.is_some() { AcquireOutcome::Acquired } else { AcquireOutcome::Occupied })
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<CasOutcome, StoreError> {
        let ttl_ms = Self::ttl_millis(ttl).to_string();
        let result: i64 = self
            .client
            .eval(COMPARE_AND_SET_SCRIPT, vec![key], vec![expected, new, ttl_ms.as_str()])
            .await
            .map_err(to_store_error)?;
        Ok(if result == 1 { CasOutcome::Ok } else { CasOutcome::Conflict })
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        self.client.publish::<(), _, _>(channel, payload).await.map_err(to_store_error)
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, StoreError> {
        let mut message_rx = self.subscriber.message_rx();
        self.subscriber.subscribe(channel).await.map_err(to_store_error)?;

        let channel = channel.to_string();
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            while let Ok(message) = message_rx.recv().await {
                if message.channel != channel.as_str() {
                    continue;
                }
                let Ok(payload) = message.value.convert::<String>() else { continue };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{prefix}*");
        let mut stream = self.client.scan_buffered(pattern, None, None);
        let mut keys = Vec::new();
        while let Some(key) = stream.next().await {
            let key = key.map_err(to_store_error)?;
            if let Some(key) = key.into_string() {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}
