// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified error taxonomy shared across the direct and broker transports.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error categories from spec §7, each carrying its own wire-level mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed envelope or out-of-range field.
    Validation,
    /// Connection refused / non-success response, exhausted retries.
    Transient,
    /// RPC GetState call timed out waiting for a reply.
    RpcTimeout,
    /// (current_state, requested transition) pair is not accepted.
    InvalidTransition,
    /// Spawning a child OS process failed; fatal at startup.
    SpawnFailure,
    Internal,
}

impl ErrorCode {
    /// HTTP status code used by the direct transport.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Transient => 502,
            Self::RpcTimeout => 504,
            Self::InvalidTransition => 400,
            Self::SpawnFailure => 500,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Transient => "TRANSIENT",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::SpawnFailure => "SPAWN_FAILURE",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
