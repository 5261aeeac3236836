// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process lifecycle: spawning child OS processes (re-invoking the same
//! binary with derived arguments) and cascading their shutdown, per spec
//! §4.6. Grounded on the teacher's `PreparedSession`/`execute_switch`
//! "spawn, track, tear down" pattern in `run.rs`.

use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tracing::{debug, warn};

use crate::config::Config;
use crate::id::NodeId;

/// Tracks the OS processes this node spawned for its own children, so their
/// shutdown can be cascaded when this node terminates.
pub struct Supervisor {
    children: Vec<Child>,
}

impl Supervisor {
    /// Spawn one child process per id returned by `self_id.children(arity)`,
    /// re-invoking the current binary, unless `self_id` is already at the
    /// configured tree depth (a leaf).
    pub fn spawn_children(config: &Config, self_id: &NodeId) -> anyhow::Result<Self> {
        if self_id.depth() >= config.levels {
            return Ok(Self { children: Vec::new() });
        }
        let child_ids = self_id.children(config.children)?;
        let exe = std::env::current_exe()?;
        let self_addr = format!("{}:{}", config.host, self_id.port_value());

        let mut children = Vec::with_capacity(child_ids.len());
        for child_id in &child_ids {
            let child = tokio::process::Command::new(&exe)
                .arg("--port")
                .arg(child_id.to_port())
                .arg("--levels")
                .arg(config.levels.to_string())
                .arg("--children")
                .arg(config.children.to_string())
                .arg("--parent")
                .arg(&self_addr)
                .arg("--host")
                .arg(&config.host)
                .arg("--architecture")
                .arg(&config.architecture)
                .arg("--broker-url")
                .arg(&config.broker_url)
                .arg("--envelope-format")
                .arg(&config.envelope_format)
                .arg("--log-format")
                .arg(&config.log_format)
                .arg("--broker-validation")
                .arg(config.broker_validation.to_string())
                .arg("--rpc-timeout")
                .arg(config.rpc_timeout.to_string())
                .arg("--rest-timeout")
                .arg(config.rest_timeout.to_string())
                .arg("--port-min")
                .arg(config.port_min.to_string())
                .arg("--port-max")
                .arg(config.port_max.to_string())
                .arg("--time-starting")
                .arg(config.time_starting.to_string())
                .arg("--time-running")
                .arg(config.time_running.to_string())
                .arg("--time-get")
                .arg(config.time_get.to_string())
                .arg("--time-shutdown")
                .arg(config.time_shutdown.to_string())
                .arg("--debug")
                .arg(config.debug.to_string())
                .spawn()
                .map_err(|e| anyhow::anyhow!("failed to spawn child {child_id}: {e}"))?;
            debug!("spawned child {child_id} (pid {:?})", child.id());
            children.push(child);
        }
        Ok(Self { children })
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Send `SIGTERM` to every spawned child and await each exit up to
    /// `deadline`; a child that doesn't exit in time is logged and left
    /// running rather than force-killed, per spec §4.6 step 2.
    pub async fn shutdown(&mut self, deadline: Duration) {
        for child in &self.children {
            if let Some(pid) = child.id() {
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    warn!("failed to signal child pid {pid}: {e}");
                }
            }
        }
        for child in &mut self.children {
            match tokio::time::timeout(deadline, child.wait()).await {
                Ok(Ok(status)) => debug!("child exited: {status}"),
                Ok(Err(e)) => warn!("error waiting for child exit: {e}"),
                Err(_) => warn!("child did not exit within {deadline:?}, leaving handle"),
            }
        }
    }
}
