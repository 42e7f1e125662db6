// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Daemon configuration (§6.4): a TOML file at `KH_CONFIG` (default
//! `./khd.toml`) merged with `KH_`-prefixed environment overrides, following
//! the env-first convention kh-daemon's predecessor used throughout.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedStoreMode {
    None,
    Distributed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub default_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { workers: 10, default_timeout_secs: 300 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct VncConfig {
    pub idle_timeout_secs: u64,
    pub on_double_attach: kh_core::DoubleAttachPolicy,
}

impl Default for VncConfig {
    fn default() -> Self {
        Self { idle_timeout_secs: 300, on_double_attach: kh_core::DoubleAttachPolicy::Reject }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub replica_identity: String,
    pub bind_addr: String,
    pub state_dir: PathBuf,
    pub shared_store_mode: SharedStoreMode,
    pub redis_url: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub dispatcher: DispatcherConfig,
    pub vnc: VncConfig,
    pub auth_token: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replica_identity: default_replica_identity(),
            bind_addr: "0.0.0.0:8080".to_string(),
            state_dir: default_state_dir(),
            shared_store_mode: SharedStoreMode::None,
            redis_url: None,
            heartbeat_interval_secs: 10,
            dispatcher: DispatcherConfig::default(),
            vnc: VncConfig::default(),
            auth_token: String::new(),
        }
    }
}

impl Default for SharedStoreMode {
    fn default() -> Self {
        SharedStoreMode::None
    }
}

fn default_replica_identity() -> String {
    std::env::var("KH_REPLICA_IDENTITY").unwrap_or_else(|_| format!("replica-{}", std::process::id()))
}

fn default_state_dir() -> PathBuf {
    std::env::var("KH_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./var/kiosk-hub"))
}

impl Config {
    /// Loads `KH_CONFIG` (default `./khd.toml`) if present, then applies
    /// `KH_*` environment overrides on top of whatever the file set (or the
    /// built-in defaults, if no file exists).
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("KH_CONFIG").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./khd.toml"));

        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(path.clone(), e))?
        } else {
            Config::default()
        };

        if let Ok(addr) = std::env::var("KH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("KH_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Ok(identity) = std::env::var("KH_REPLICA_IDENTITY") {
            config.replica_identity = identity;
        }
        if let Ok(url) = std::env::var("KH_REDIS_URL") {
            config.redis_url = Some(url);
            config.shared_store_mode = SharedStoreMode::Distributed;
        }
        if let Ok(token) = std::env::var("KH_AUTH_TOKEN") {
            config.auth_token = token;
        }

        Ok(config)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.state_dir.join("wal.jsonl")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("state.snap")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("khd.lock")
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        self.heartbeat_interval() * 3
    }

    pub fn dispatcher_default_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatcher.default_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_ttl_is_three_times_interval() {
        let mut config = Config::default();
        config.heartbeat_interval_secs = 10;
        assert_eq!(config.heartbeat_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn redis_url_env_override_flips_shared_store_mode() {
        let mut config = Config::default();
        assert_eq!(config.shared_store_mode, SharedStoreMode::None);
        config.redis_url = Some("redis://localhost".into());
        config.shared_store_mode = SharedStoreMode::Distributed;
        assert_eq!(config.shared_store_mode, SharedStoreMode::Distributed);
    }
}
