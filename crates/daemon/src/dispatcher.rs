// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Command Dispatcher (C5): persists commands, drives them through
//! `pending -> sent -> acked -> completed|failed|timeout`, retries
//! `no_route`/`agent_offline` with backoff, and serializes dispatch per
//! `session_id` so one session's commands always execute in enqueue order.

use crate::error::DaemonError;
use crate::hub::{AgentHub, SendOutcome};
use crate::store::Store;
use kh_core::{Clock, Command, CommandId, CommandStatus, CommandType, Event, SessionId, SessionState};
use kh_wire::HubMessage;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

const RETRY_BACKOFFS_SECS: [u64; 5] = [2, 4, 8, 16, 32];

/// Maps a terminal command outcome onto the session state it implies.
/// `vnc_connect`/`vnc_disconnect` never move the session state machine —
/// only the four lifecycle command types do.
fn session_state_for(command_type: CommandType, status: CommandStatus) -> Option<SessionState> {
    use CommandType::*;
    match (command_type, status) {
        (StartSession, CommandStatus::Completed) => Some(SessionState::Running),
        (StartSession, _) => Some(SessionState::Failed),
        (StopSession, CommandStatus::Completed) => Some(SessionState::Terminated),
        (StopSession, _) => Some(SessionState::Failed),
        (HibernateSession, CommandStatus::Completed) => Some(SessionState::Hibernated),
        (HibernateSession, _) => Some(SessionState::Running),
        (WakeSession, CommandStatus::Completed) => Some(SessionState::Running),
        (WakeSession, _) => Some(SessionState::Hibernated),
        (VncConnect, _) | (VncDisconnect, _) => None,
    }
}

pub struct CommandDispatcher<C: Clock> {
    store: Arc<Store>,
    hub: Arc<AgentHub<C>>,
    clock: C,
    default_timeout: Duration,
    session_queues: Mutex<HashMap<SessionId, VecDeque<CommandId>>>,
    dispatch_tx: mpsc::Sender<SessionId>,
}

impl<C: Clock + 'static> CommandDispatcher<C> {
    pub fn spawn(store: Arc<Store>, hub: Arc<AgentHub<C>>, clock: C, workers: usize, default_timeout: Duration) -> Arc<Self> {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(1024);
        let dispatcher = Arc::new(Self {
            store,
            hub,
            clock,
            default_timeout,
            session_queues: Mutex::new(HashMap::new()),
            dispatch_tx,
        });

        dispatcher.spawn_workers(workers, dispatch_rx);
        dispatcher.spawn_reaper();
        dispatcher
    }

    fn spawn_workers(self: &Arc<Self>, workers: usize, dispatch_rx: mpsc::Receiver<SessionId>) {
        let dispatch_rx = Arc::new(tokio::sync::Mutex::new(dispatch_rx));
        for _ in 0..workers.max(1) {
            let dispatcher = Arc::clone(self);
            let dispatch_rx = Arc::clone(&dispatch_rx);
            tokio::spawn(async move {
                loop {
                    let session_id = {
                        let mut rx = dispatch_rx.lock().await;
                        match rx.recv().await {
                            Some(s) => s,
                            None => return,
                        }
                    };
                    dispatcher.try_dispatch_head(&session_id).await;
                }
            });
        }
    }

    fn spawn_reaper(self: &Arc<Self>) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(5)).await;
                dispatcher.reap_expired();
            }
        });
    }

    fn reap_expired(&self) {
        let now = self.clock.epoch_ms();
        let expired: Vec<Command> =
            self.store.read(|s| s.commands.values().filter(|c| c.is_past_deadline(now)).cloned().collect());
        for command in expired {
            warn!(command_id = %command.command_id, "command reaped to timeout");
            let _ = self.store.apply(Event::CommandStatusChanged {
                command_id: command.command_id,
                status: CommandStatus::Timeout,
                result: None,
                error: Some("deadline exceeded".to_string()),
                at_ms: now,
            });
            self.advance_session_queue(&command.session_id);
        }
    }

    /// Persists a new command and, if its session has no command already in
    /// flight, signals a worker to dispatch it immediately.
    pub async fn enqueue(
        &self,
        agent_id: kh_core::AgentId,
        session_id: SessionId,
        command_type: CommandType,
        payload: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<CommandId, DaemonError> {
        let command_id = CommandId::new();
        let now = self.clock.epoch_ms();
        let deadline_at_ms = now + timeout.unwrap_or(self.default_timeout).as_millis() as u64;

        self.store.apply(Event::CommandCreated {
            command_id,
            agent_id,
            session_id: session_id.clone(),
            command_type,
            payload,
            deadline_at_ms,
            at_ms: now,
        })?;

        let should_signal = {
            let mut queues = self.session_queues.lock();
            let queue = queues.entry(session_id.clone()).or_default();
            let was_empty = queue.is_empty();
            queue.push_back(command_id);
            was_empty
        };
        if should_signal {
            let _ = self.dispatch_tx.send(session_id).await;
        }

        Ok(command_id)
    }

    async fn try_dispatch_head(&self, session_id: &SessionId) {
        let head = {
            let queues = self.session_queues.lock();
            queues.get(session_id).and_then(|q| q.front().copied())
        };
        let Some(command_id) = head else { return };
        let Some(command) = self.store.read(|s| s.commands.get(&command_id).cloned()) else { return };
        if command.status != CommandStatus::Pending {
            return;
        }

        let message = HubMessage::Command {
            command_id: command.command_id,
            session_id: command.session_id.clone(),
            command_type: command.command_type,
            payload: command.payload.clone(),
            deadline_at_ms: command.deadline_at_ms,
        };

        match self.hub.send(&command.agent_id, message).await {
            SendOutcome::Delivered => {
                let _ = self.store.apply(Event::CommandStatusChanged {
                    command_id: command.command_id,
                    status: CommandStatus::Sent,
                    result: None,
                    error: None,
                    at_ms: self.clock.epoch_ms(),
                });
            }
            SendOutcome::NoRoute | SendOutcome::AgentOffline => {
                self.schedule_retry(command).await;
            }
        }
    }

    async fn schedule_retry(&self, command: Command) {
        let now = self.clock.epoch_ms();
        let retry_count = command.retry_count + 1;
        let backoff = RETRY_BACKOFFS_SECS
            .get(command.retry_count as usize)
            .copied()
            .unwrap_or(*RETRY_BACKOFFS_SECS.last().unwrap_or(&32));
        let backoff = Duration::from_secs(backoff);

        let _ = self.store.apply(Event::CommandRetryScheduled {
            command_id: command.command_id,
            retry_count,
            at_ms: now,
        });

        if now + backoff.as_millis() as u64 >= command.deadline_at_ms {
            // Deadline will pass before the next attempt; let the reaper
            // time it out instead of scheduling a doomed retry.
            return;
        }

        let dispatch_tx = self.dispatch_tx.clone();
        let session_id = command.session_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let _ = dispatch_tx.send(session_id).await;
        });
    }

    pub fn on_ack(&self, command_id: CommandId) {
        let now = self.clock.epoch_ms();
        let _ = self.store.apply(Event::CommandStatusChanged {
            command_id,
            status: CommandStatus::Acked,
            result: None,
            error: None,
            at_ms: now,
        });
    }

    pub fn on_complete(&self, command_id: CommandId, result: Option<serde_json::Value>) {
        self.finish(command_id, CommandStatus::Completed, result, None);
    }

    pub fn on_fail(&self, command_id: CommandId, error: String) {
        self.finish(command_id, CommandStatus::Failed, None, Some(error));
    }

    fn finish(
        &self,
        command_id: CommandId,
        status: CommandStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        let Some(command) = self.store.read(|s| s.commands.get(&command_id).cloned()) else {
            warn!(command_id = %command_id, "terminal status for unknown command");
            return;
        };
        if command.status.is_terminal() {
            warn!(command_id = %command_id, prior_status = %command.status, "dropped late/duplicate terminal status");
            return;
        }
        let now = self.clock.epoch_ms();
        let _ = self.store.apply(Event::CommandStatusChanged { command_id, status, result, error, at_ms: now });
        info!(command_id = %command_id, %status, "command reached terminal status");

        if let Some(session_state) = session_state_for(command.command_type, status) {
            let _ = self.store.apply(Event::SessionStateChanged {
                session_id: command.session_id.clone(),
                state: session_state,
                at_ms: now,
            });
        }

        self.advance_session_queue(&command.session_id);
    }

    /// Drops terminal commands off the front of a session's queue and, if a
    /// new head is now pending, wakes a worker for it.
    fn advance_session_queue(&self, session_id: &SessionId) {
        let next = {
            let mut queues = self.session_queues.lock();
            let Some(queue) = queues.get_mut(session_id) else { return };
            loop {
                match queue.front() {
                    Some(id) => {
                        let terminal = self.store.read(|s| {
                            s.commands.get(id).map(|c| c.status.is_terminal()).unwrap_or(true)
                        });
                        if terminal {
                            queue.pop_front();
                        } else {
                            break;
                        }
                    }
                    None => break,
                }
            }
            if queue.is_empty() {
                queues.remove(session_id);
                None
            } else {
                Some(session_id.clone())
            }
        };
        if let Some(session_id) = next {
            let dispatch_tx = self.dispatch_tx.clone();
            tokio::spawn(async move {
                let _ = dispatch_tx.send(session_id).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kh_core::{AgentId, Capacity, FakeClock, Platform, ReplicaId};
    use kh_sharedstore::{LocalStore, SharedStore};
    use std::collections::HashMap as StdHashMap;

    async fn setup() -> (Arc<Store>, Arc<AgentHub<FakeClock>>, Arc<CommandDispatcher<FakeClock>>, mpsc::Receiver<HubMessage>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(Store::open(dir.path().join("wal"), dir.path().join("snap")).expect("open"));
        let shared: Arc<dyn SharedStore> = Arc::new(LocalStore::new());
        let clock = FakeClock::new();
        let hub = AgentHub::spawn(Arc::clone(&store), shared, ReplicaId::new("r1"), Duration::from_secs(30), clock.clone());

        let (tx, rx) = mpsc::channel(16);
        hub.on_agent_registered(
            AgentId::new("a1"),
            Platform::Docker,
            "local".into(),
            Capacity { max_sessions: 4, cpu_millis: None, memory_mb: None },
            StdHashMap::new(),
            tx,
        )
        .await
        .expect("register");

        let dispatcher = CommandDispatcher::spawn(Arc::clone(&store), Arc::clone(&hub), clock, 2, Duration::from_secs(300));
        (store, hub, dispatcher, rx)
    }

    #[tokio::test]
    async fn enqueue_dispatches_to_registered_agent() {
        let (store, _hub, dispatcher, mut rx) = setup().await;
        let command_id = dispatcher
            .enqueue(AgentId::new("a1"), SessionId::new("s1"), CommandType::StartSession, serde_json::json!({}), None)
            .await
            .expect("enqueue");

        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no timeout")
            .expect("message");
        assert!(matches!(message, HubMessage::Command { command_id: cid, .. } if cid == command_id));

        let status = store.read(|s| s.commands.get(&command_id).map(|c| c.status));
        assert_eq!(status, Some(CommandStatus::Sent));
    }

    #[tokio::test]
    async fn second_command_for_same_session_waits_for_first_to_terminate() {
        let (store, _hub, dispatcher, mut rx) = setup().await;
        let first = dispatcher
            .enqueue(AgentId::new("a1"), SessionId::new("s1"), CommandType::StartSession, serde_json::json!({}), None)
            .await
            .expect("enqueue first");
        let second = dispatcher
            .enqueue(AgentId::new("a1"), SessionId::new("s1"), CommandType::StopSession, serde_json::json!({}), None)
            .await
            .expect("enqueue second");

        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.expect("no timeout").expect("msg");
        assert!(matches!(message, HubMessage::Command { command_id: cid, .. } if cid == first));

        // second must still be pending, not yet sent
        assert_eq!(store.read(|s| s.commands.get(&second).map(|c| c.status)), Some(CommandStatus::Pending));

        dispatcher.on_complete(first, None);

        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.expect("no timeout").expect("msg");
        assert!(matches!(message, HubMessage::Command { command_id: cid, .. } if cid == second));
    }

    #[tokio::test]
    async fn ack_then_complete_reaches_completed_status() {
        let (store, _hub, dispatcher, mut rx) = setup().await;
        let command_id = dispatcher
            .enqueue(AgentId::new("a1"), SessionId::new("s1"), CommandType::StartSession, serde_json::json!({}), None)
            .await
            .expect("enqueue");
        rx.recv().await;

        dispatcher.on_ack(command_id);
        assert_eq!(store.read(|s| s.commands.get(&command_id).map(|c| c.status)), Some(CommandStatus::Acked));

        dispatcher.on_complete(command_id, Some(serde_json::json!({"ok": true})));
        assert_eq!(store.read(|s| s.commands.get(&command_id).map(|c| c.status)), Some(CommandStatus::Completed));
    }

    #[tokio::test]
    async fn fail_marks_command_failed_without_retry() {
        let (store, _hub, dispatcher, mut rx) = setup().await;
        let command_id = dispatcher
            .enqueue(AgentId::new("a1"), SessionId::new("s1"), CommandType::StartSession, serde_json::json!({}), None)
            .await
            .expect("enqueue");
        rx.recv().await;

        dispatcher.on_fail(command_id, "container image pull failed".to_string());
        assert_eq!(store.read(|s| s.commands.get(&command_id).map(|c| c.status)), Some(CommandStatus::Failed));
    }

    #[tokio::test]
    async fn send_to_unrouted_agent_retries_and_stays_pending() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(Store::open(dir.path().join("wal"), dir.path().join("snap")).expect("open"));
        let shared: Arc<dyn SharedStore> = Arc::new(LocalStore::new());
        let clock = FakeClock::new();
        let hub = AgentHub::spawn(Arc::clone(&store), shared, ReplicaId::new("r1"), Duration::from_secs(30), clock.clone());
        let dispatcher = CommandDispatcher::spawn(Arc::clone(&store), hub, clock, 2, Duration::from_secs(300));

        let command_id = dispatcher
            .enqueue(AgentId::new("ghost"), SessionId::new("s1"), CommandType::StartSession, serde_json::json!({}), None)
            .await
            .expect("enqueue");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let command = store.read(|s| s.commands.get(&command_id).cloned()).expect("command exists");
        assert_eq!(command.status, CommandStatus::Pending);
        assert_eq!(command.retry_count, 1);
    }

    #[tokio::test]
    async fn completed_start_session_moves_session_to_running() {
        let (store, _hub, dispatcher, mut rx) = setup().await;
        store
            .apply(Event::SessionRegistered {
                session_id: SessionId::new("s1"),
                agent_id: AgentId::new("a1"),
                platform: Platform::Docker,
                owner_user_id: "u1".into(),
                at_ms: 0,
            })
            .expect("register session");

        let command_id = dispatcher
            .enqueue(AgentId::new("a1"), SessionId::new("s1"), CommandType::StartSession, serde_json::json!({}), None)
            .await
            .expect("enqueue");
        rx.recv().await;

        dispatcher.on_complete(command_id, None);
        let state = store.read(|s| s.sessions.get(&SessionId::new("s1")).map(|s| s.state));
        assert_eq!(state, Some(kh_core::SessionState::Running));
    }
}
