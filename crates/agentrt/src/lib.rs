// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! The Agent Runtime (§4.7): the process that runs alongside a container
//! platform, executes commands dispatched over the Agent Link, and proxies
//! VNC traffic between a session's RFB port and the hub.

pub mod commands;
pub mod config;
pub mod driver;
pub mod election;
pub mod link;
pub mod runtime;
pub mod vnc;
