// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! VNC tunnel identity.
//!
//! A tunnel is a live end-to-end relay for exactly one session; the hub
//! enforces at most one per `session_id` (policy-configurable, §4.6).

use crate::agent::AgentId;
use crate::session::SessionId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a VNC tunnel instance.
    pub struct TunnelId("vnc-");
}

/// Policy applied when a second browser attaches to a session already
/// carrying a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoubleAttachPolicy {
    Reject,
    Supersede,
}

impl Default for DoubleAttachPolicy {
    fn default() -> Self {
        DoubleAttachPolicy::Reject
    }
}

/// Bookkeeping record for a live tunnel, owned per-replica (never shared
/// across replicas, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelRecord {
    pub tunnel_id: TunnelId,
    pub session_id: SessionId,
    pub agent_id: AgentId,
    pub opened_at_ms: u64,
    pub last_activity_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_double_attach_policy_is_reject() {
        assert_eq!(DoubleAttachPolicy::default(), DoubleAttachPolicy::Reject);
    }

    #[test]
    fn tunnel_id_has_stable_prefix() {
        let id = TunnelId::new();
        assert!(id.as_str().starts_with("vnc-"));
    }
}
