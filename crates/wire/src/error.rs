// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Error kinds the core distinguishes (§7), independent of any particular
//! HTTP framework so both `kh-daemon` and tests can match on them directly.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("missing or invalid credentials")]
    Unauthenticated,

    #[error("caller is not authorized for this resource")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no acceptable agent: {0}")]
    NoCapacity(String),

    #[error("command timed out")]
    CommandTimeout,
}

impl ApiError {
    /// HTTP status code per §7.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Unauthenticated => 401,
            ApiError::Unauthorized => 403,
            ApiError::NotFound(_) => 404,
            ApiError::InvalidTransition(_) => 400,
            ApiError::InvalidInput(_) => 422,
            ApiError::Conflict(_) => 409,
            ApiError::NoCapacity(_) => 503,
            ApiError::CommandTimeout => 504,
        }
    }

    /// Machine-readable error tag used in `ErrorEnvelope::error`.
    pub fn error_tag(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Unauthorized => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::InvalidTransition(_) => "invalid_transition",
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::Conflict(_) => "conflict",
            ApiError::NoCapacity(_) => "no_capacity",
            ApiError::CommandTimeout => "command_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_section_seven() {
        assert_eq!(ApiError::Unauthenticated.status_code(), 401);
        assert_eq!(ApiError::Unauthorized.status_code(), 403);
        assert_eq!(ApiError::NotFound("agent".into()).status_code(), 404);
        assert_eq!(ApiError::InvalidTransition("x".into()).status_code(), 400);
        assert_eq!(ApiError::Conflict("double-attach".into()).status_code(), 409);
        assert_eq!(ApiError::NoCapacity("draining".into()).status_code(), 503);
    }
}
