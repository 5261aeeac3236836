// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line / environment configuration, covering every key in spec §6.

use std::str::FromStr;

use clap::Parser;

use crate::envelope::Format;

/// Which transport implementation a node uses to talk to its parent/children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Direct,
    Broker,
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "broker" => Ok(Self::Broker),
            other => Err(format!("unknown architecture {other:?}, expected direct|broker")),
        }
    }
}

/// One node's full configuration, parsed from CLI flags with environment
/// variable fallback (`NODETREE_*`), matching every configuration key from
/// spec.md §6.
#[derive(Debug, Parser)]
#[command(name = "nodetree", version, about = "One node in a distributed hierarchical state-machine tree.")]
pub struct Config {
    /// This node's TCP port; also encodes its position via [`crate::id::NodeId`].
    #[arg(long, env = "NODETREE_PORT", default_value_t = 20000)]
    pub port: u32,

    /// Number of levels below this node (0 = leaf-only root).
    #[arg(long, env = "NODETREE_LEVELS", default_value_t = 0)]
    pub levels: u8,

    /// Number of children each non-leaf node has.
    #[arg(long, env = "NODETREE_CHILDREN", default_value_t = 3)]
    pub children: u8,

    /// Parent address ("IP:PORT"), absent for the realm root.
    #[arg(long, env = "NODETREE_PARENT")]
    pub parent: Option<String>,

    /// Host this node (and any children it spawns) binds to / is addressed at.
    #[arg(long, env = "NODETREE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// `direct` (HTTP request/response) or `broker` (NATS topics + RPC).
    #[arg(long, env = "NODETREE_ARCHITECTURE", default_value = "direct")]
    pub architecture: String,

    /// NATS server URL, only used when `architecture = broker`.
    #[arg(long, env = "NODETREE_BROKER_URL", default_value = "nats://127.0.0.1:4222")]
    pub broker_url: String,

    /// RPC GetState timeout in seconds (broker transport).
    #[arg(long, env = "NODETREE_RPC_TIMEOUT", default_value_t = 2.0)]
    pub rpc_timeout: f64,

    /// Wire envelope format: `text` (JSON) or `binary` (length-prefixed).
    #[arg(long, env = "NODETREE_ENVELOPE_FORMAT", default_value = "text")]
    pub envelope_format: String,

    /// Whether the broker transport validates envelopes before acting on them.
    #[arg(long, env = "NODETREE_BROKER_VALIDATION", default_value_t = true, action = clap::ArgAction::Set)]
    pub broker_validation: bool,

    /// Minimum valid port (inclusive).
    #[arg(long, env = "NODETREE_PORT_MIN", default_value_t = 10_000)]
    pub port_min: u32,

    /// Maximum valid port (exclusive).
    #[arg(long, env = "NODETREE_PORT_MAX", default_value_t = 60_000)]
    pub port_max: u32,

    /// Max retry attempts for direct-transport outbound sends.
    #[arg(long, env = "NODETREE_REST_TIMEOUT", default_value_t = 3)]
    pub rest_timeout: u32,

    /// Seconds a Starting leaf waits before its fail-roll / Orange dispatch.
    #[arg(long, env = "NODETREE_TIME_STARTING", default_value_t = 1.0)]
    pub time_starting: f64,

    /// Seconds between fail-rolls while Running.
    #[arg(long, env = "NODETREE_TIME_RUNNING", default_value_t = 5.0)]
    pub time_running: f64,

    /// Artificial delay before answering a GetState request.
    #[arg(long, env = "NODETREE_TIME_GET", default_value_t = 1.0)]
    pub time_get: f64,

    /// Seconds to wait for children to exit during cascading shutdown.
    #[arg(long, env = "NODETREE_TIME_SHUTDOWN", default_value_t = 5.0)]
    pub time_shutdown: f64,

    /// Diagnostic logging (`tracing` level floor drops to `debug`).
    #[arg(long, env = "NODETREE_DEBUG", default_value_t = false, action = clap::ArgAction::Set)]
    pub debug: bool,

    /// Log format: `json` or `text`.
    #[arg(long, env = "NODETREE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Config {
    /// Validate cross-field invariants from spec §6 (`node.port.*`,
    /// `node.depth.*`, `node.children.*` ranges).
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port < self.port_min || self.port >= self.port_max {
            anyhow::bail!("--port {} out of range [{}, {})", self.port, self.port_min, self.port_max);
        }
        if self.levels >= 5 {
            anyhow::bail!("--levels {} out of range [0, 5)", self.levels);
        }
        if self.children == 0 || self.children >= 10 {
            anyhow::bail!("--children {} out of range [1, 10)", self.children);
        }
        self.architecture_enum()?;
        self.envelope_format_enum()?;
        if let Some(ref parent) = self.parent {
            parse_address(parent)?;
        }
        Ok(())
    }

    pub fn architecture_enum(&self) -> anyhow::Result<Architecture> {
        self.architecture.parse().map_err(|e: String| anyhow::anyhow!(e))
    }

    pub fn envelope_format_enum(&self) -> anyhow::Result<Format> {
        self.envelope_format.parse().map_err(|e: String| anyhow::anyhow!(e))
    }
}

/// Parse and validate an `"IP:PORT"` address string.
pub fn parse_address(address: &str) -> anyhow::Result<(String, u32)> {
    let (ip, port) = address
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("{address:?} is not in IP:PORT format"))?;
    let octets: Vec<&str> = ip.split('.').collect();
    let valid_ip = octets.len() == 4 && octets.iter().all(|o| o.parse::<u16>().is_ok_and(|v| v <= 255));
    if !valid_ip {
        anyhow::bail!("{ip:?} is not a valid IPv4 address");
    }
    let port: u32 = port.parse().map_err(|_| anyhow::anyhow!("{port:?} is not a valid port"))?;
    Ok((ip.to_owned(), port))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
