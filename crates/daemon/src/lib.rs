// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! kh-daemon: the kiosk-hub control-plane replica — Agent Hub, Command
//! Dispatcher, VNC Proxy, Leader Elector wiring, and the HTTP/WebSocket
//! surface that fronts them.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod http;
pub mod lifecycle;
pub mod link_ws;
pub mod store;
pub mod vnc;

use config::Config;
use dispatcher::CommandDispatcher;
use hub::AgentHub;
use kh_core::SystemClock;
use std::sync::Arc;
use store::Store;
use vnc::TunnelManager;

/// Shared handles every HTTP and WebSocket route needs. Built once at
/// startup by `lifecycle::startup` and cloned as an `Arc` into the router.
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub hub: Arc<AgentHub<SystemClock>>,
    pub dispatcher: Arc<CommandDispatcher<SystemClock>>,
    pub vnc: Arc<TunnelManager<SystemClock>>,
}
