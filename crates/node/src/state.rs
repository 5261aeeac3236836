// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The node's lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One node's observable lifecycle state.
///
/// `Error` is terminal and sticky: once a node (or an ancestor aggregating
/// over it) enters `Error`, nothing but a process restart clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Initialisation,
    Stopped,
    Starting,
    Running,
    Error,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialisation => "Initialisation",
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Error => "Error",
        }
    }

    /// Parse a bare state name (`"Running"`, not `"State.Running"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Initialisation" => Some(Self::Initialisation),
            "Stopped" => Some(Self::Stopped),
            "Starting" => Some(Self::Starting),
            "Running" => Some(Self::Running),
            "Error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether this state is the sticky terminal state.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
