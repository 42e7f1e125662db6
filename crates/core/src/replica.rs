// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Replica identity.
//!
//! A replica identity claims ownership of routing keys in the shared state
//! store (§4.4). It is operator-supplied (`replica_identity` config) rather
//! than generated, so it survives process restarts when deployments pin it
//! (e.g. to the pod name).

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Routing key for which replica currently holds an agent's link.
    pub fn pod_key(agent_id: &str) -> String {
        format!("agent:{agent_id}:pod")
    }

    /// Routing key for an agent's last heartbeat.
    pub fn heartbeat_key(agent_id: &str) -> String {
        format!("agent:{agent_id}:heartbeat")
    }

    /// Pub/sub channel a replica subscribes to for commands routed to it
    /// from a peer replica.
    pub fn inbox_channel(&self) -> String {
        format!("replica:{}:inbox", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReplicaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReplicaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for ReplicaId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_keys_match_spec_layout() {
        assert_eq!(ReplicaId::pod_key("k8s-a"), "agent:k8s-a:pod");
        assert_eq!(ReplicaId::heartbeat_key("k8s-a"), "agent:k8s-a:heartbeat");
        assert_eq!(ReplicaId::new("r1").inbox_channel(), "replica:r1:inbox");
    }
}
