// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Session projection event handlers.
//!
//! The authoritative session record lives outside the core (§3); this
//! projection carries only what the dispatcher and VNC proxy need to route
//! work, kept current by replaying the same events that drive persistence.

use kh_core::{Event, SessionRef, SessionState};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::SessionRegistered { session_id, agent_id, platform, owner_user_id, .. } => {
            state.sessions.entry(session_id.clone()).or_insert_with(|| SessionRef {
                session_id: session_id.clone(),
                agent_id: agent_id.clone(),
                platform: *platform,
                state: SessionState::Pending,
                vnc_address: None,
                owner_user_id: owner_user_id.clone(),
            });
        }

        Event::SessionStateChanged { session_id, state: new_state, .. } => {
            if let Some(rec) = state.sessions.get_mut(session_id) {
                rec.state = *new_state;
                if !matches!(new_state, SessionState::Running) {
                    rec.vnc_address = None;
                }
            }
        }

        _ => {}
    }
}
