// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Command lifecycle event handlers.
//!
//! `start_session`/`stop_session` completion is also where `Agent::sessions_in_use`
//! is mutated — the dispatcher is the only writer of that counter (§4.5).

use kh_core::{Command, CommandStatus, CommandType, Event};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::CommandCreated {
            command_id,
            agent_id,
            session_id,
            command_type,
            payload,
            deadline_at_ms,
            at_ms,
        } => {
            state.commands.entry(*command_id).or_insert_with(|| Command {
                command_id: *command_id,
                agent_id: agent_id.clone(),
                session_id: session_id.clone(),
                command_type: *command_type,
                payload: payload.clone(),
                status: CommandStatus::Pending,
                result: None,
                error: None,
                created_at_ms: *at_ms,
                sent_at_ms: None,
                completed_at_ms: None,
                deadline_at_ms: *deadline_at_ms,
                retry_count: 0,
            });
        }

        Event::CommandStatusChanged { command_id, status, result, error, at_ms } => {
            let Some(cmd) = state.commands.get_mut(command_id) else {
                return;
            };
            if cmd.status == *status {
                return;
            }
            if !cmd.status.can_transition_to(*status) {
                return;
            }
            let command_type = cmd.command_type;
            let agent_id = cmd.agent_id.clone();
            cmd.status = *status;
            match status {
                CommandStatus::Sent if cmd.sent_at_ms.is_none() => cmd.sent_at_ms = Some(*at_ms),
                CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Timeout => {
                    cmd.completed_at_ms = Some(*at_ms);
                    cmd.result = result.clone();
                    cmd.error = error.clone();
                }
                _ => {}
            }

            if *status == CommandStatus::Completed {
                if let Some(agent) = state.agents.get_mut(&agent_id) {
                    match command_type {
                        CommandType::StartSession => agent.sessions_in_use += 1,
                        CommandType::StopSession => {
                            agent.sessions_in_use = agent.sessions_in_use.saturating_sub(1)
                        }
                        _ => {}
                    }
                }
            }
        }

        Event::CommandRetryScheduled { command_id, retry_count, .. } => {
            if let Some(cmd) = state.commands.get_mut(command_id) {
                cmd.retry_count = *retry_count;
                if !cmd.status.is_terminal() {
                    cmd.status = CommandStatus::Pending;
                }
            }
        }

        _ => {}
    }
}
