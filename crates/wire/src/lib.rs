// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kh-wire: Agent Link envelopes and HTTP API DTOs shared between
//! `kh-daemon` and `kh-agentrt`.

pub mod error;
pub mod http;
pub mod link;

pub use error::ApiError;
pub use link::{AgentMessage, HubMessage, RegisterCapacity};
