// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! VNC tunnel bookkeeping event handlers.
//!
//! Tunnel state is per-replica (§5): only the replica that opened a tunnel
//! ever applies these events for it, so there is no cross-replica merge to
//! worry about.

use kh_core::{Event, TunnelRecord};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::TunnelOpened { tunnel_id, session_id, agent_id, at_ms } => {
            state.tunnels.entry(*tunnel_id).or_insert_with(|| TunnelRecord {
                tunnel_id: *tunnel_id,
                session_id: session_id.clone(),
                agent_id: agent_id.clone(),
                opened_at_ms: *at_ms,
                last_activity_ms: *at_ms,
            });
        }

        Event::TunnelClosed { tunnel_id, .. } => {
            state.tunnels.remove(tunnel_id);
        }

        _ => {}
    }
}
