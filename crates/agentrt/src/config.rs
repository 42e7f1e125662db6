// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Agent runtime configuration (§4.7, §6.4): a TOML file at `KH_CONFIG`
//! (default `./kha.toml`) merged with `KH_`-prefixed environment overrides,
//! mirroring `kh-daemon`'s config convention.

use kh_core::Platform;
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
pub enum ElectionBackend {
    /// `FileLockElector`, for a single host running one replica.
    FileLock,
    /// `DistributedLockElector`, built on the Shared State Store's CAS ops.
    DistributedLock,
    /// `ClusterLeaseElector`, a `coordination.k8s.io/v1 Lease`.
    ClusterLease,
}

impl Default for ElectionBackend {
    fn default() -> Self {
        ElectionBackend::FileLock
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub max_sessions: u32,
    pub cpu_millis: Option<u32>,
    pub memory_mb: Option<u32>,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self { max_sessions: 4, cpu_millis: None, memory_mb: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent_id: String,
    pub hub_url: String,
    pub platform: Platform,
    pub region: String,
    pub capacity: CapacityConfig,
    pub state_dir: PathBuf,
    pub election_backend: ElectionBackend,
    pub redis_url: Option<String>,
    pub k8s_namespace: String,
    pub k8s_lease_name: String,
    pub docker_image: String,
    pub reconnect_min_secs: u64,
    pub reconnect_max_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            hub_url: "ws://127.0.0.1:8080/agent/ws".to_string(),
            platform: Platform::Docker,
            region: "local".to_string(),
            capacity: CapacityConfig::default(),
            state_dir: default_state_dir(),
            election_backend: ElectionBackend::FileLock,
            redis_url: None,
            k8s_namespace: "default".to_string(),
            k8s_lease_name: "kiosk-hub-agentrt".to_string(),
            docker_image: "kiosk-hub-session:latest".to_string(),
            reconnect_min_secs: 2,
            reconnect_max_secs: 32,
        }
    }
}

fn default_agent_id() -> String {
    std::env::var("KH_AGENT_ID").unwrap_or_else(|_| format!("agent-{}", std::process::id()))
}

fn default_state_dir() -> PathBuf {
    std::env::var("KH_STATE_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./var/kiosk-hub-agent"))
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("KH_CONFIG").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./kha.toml"));

        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(path.clone(), e))?
        } else {
            Config::default()
        };

        if let Ok(agent_id) = std::env::var("KH_AGENT_ID") {
            config.agent_id = agent_id;
        }
        if let Ok(url) = std::env::var("KH_HUB_URL") {
            config.hub_url = url;
        }
        if let Ok(dir) = std::env::var("KH_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("KH_REDIS_URL") {
            config.redis_url = Some(url);
            config.election_backend = ElectionBackend::DistributedLock;
        }

        Ok(config)
    }

    pub fn election_lock_path(&self) -> PathBuf {
        self.state_dir.join("kha.lock")
    }

    pub fn reconnect_min(&self) -> Duration {
        Duration::from_secs(self.reconnect_min_secs)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_election_backend_is_file_lock() {
        assert_eq!(Config::default().election_backend, ElectionBackend::FileLock);
    }

    #[test]
    fn election_lock_path_is_under_state_dir() {
        let mut config = Config::default();
        config.state_dir = PathBuf::from("/tmp/kha-test");
        assert_eq!(config.election_lock_path(), PathBuf::from("/tmp/kha-test/kha.lock"));
    }
}
