// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenario tests.
//!
//! Spawns the real `nodetree` binary as a subprocess (direct transport) and
//! drives it over its HTTP wire protocol, the same way one node in the
//! realm drives another.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `nodetree` binary.
pub fn nodetree_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("nodetree")
}

/// Find a free TCP port by binding to `:0` then releasing it.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `nodetree` process (root of its own subtree), killed on drop.
pub struct NodeTreeProcess {
    child: Child,
    port: u16,
}

/// Builder for spawning a `nodetree` node with non-default configuration.
pub struct NodeTreeBuilder {
    port: u16,
    levels: u8,
    children: u8,
    parent: Option<String>,
    time_starting: f64,
    time_running: f64,
    time_get: f64,
}

impl NodeTreeBuilder {
    /// Spawn with a specific port rather than one picked by the OS. The
    /// port-tree scenarios from §8 need exact, structurally-related ports
    /// (20000, 21000, 21100, ...) so children land at the ids their parent
    /// expects.
    pub fn at_port(port: u16) -> Self {
        Self::new(port)
    }

    fn new(port: u16) -> Self {
        Self {
            port,
            levels: 0,
            children: 3,
            parent: None,
            time_starting: 0.1,
            time_running: 3600.0,
            time_get: 0.0,
        }
    }

    pub fn levels(mut self, levels: u8) -> Self {
        self.levels = levels;
        self
    }

    pub fn children(mut self, children: u8) -> Self {
        self.children = children;
        self
    }

    pub fn parent(mut self, addr: &str) -> Self {
        self.parent = Some(addr.to_owned());
        self
    }

    pub fn time_starting(mut self, secs: f64) -> Self {
        self.time_starting = secs;
        self
    }

    pub fn spawn(self) -> anyhow::Result<NodeTreeProcess> {
        let binary = nodetree_binary();
        anyhow::ensure!(binary.exists(), "nodetree binary not found at {}", binary.display());

        let mut args: Vec<String> = vec![
            "--port".into(),
            self.port.to_string(),
            "--levels".into(),
            self.levels.to_string(),
            "--children".into(),
            self.children.to_string(),
            "--host".into(),
            "127.0.0.1".into(),
            "--architecture".into(),
            "direct".into(),
            "--log-format".into(),
            "text".into(),
            "--time-starting".into(),
            self.time_starting.to_string(),
            "--time-running".into(),
            self.time_running.to_string(),
            "--time-get".into(),
            self.time_get.to_string(),
            "--time-shutdown".into(),
            "2".into(),
            // free_port() hands back whatever the OS considers ephemeral,
            // which can run past the crate's default 60000 ceiling.
            "--port-min".into(),
            "10000".into(),
            "--port-max".into(),
            "65536".into(),
        ];
        if let Some(ref parent) = self.parent {
            args.extend(["--parent".into(), parent.clone()]);
        }

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(NodeTreeProcess { child, port: self.port })
    }
}

impl NodeTreeProcess {
    /// Create a builder for a node bound to a freshly allocated port.
    pub fn build() -> anyhow::Result<NodeTreeBuilder> {
        Ok(NodeTreeBuilder::new(free_port()?))
    }

    /// Spawn a single leaf node (`levels = 0`) with no parent.
    pub fn start_leaf() -> anyhow::Result<Self> {
        Self::build()?.spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Poll `/healthz` until the node's HTTP server is accepting connections.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/healthz", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("node on port {} did not become healthy within {timeout:?}", self.port);
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// `GET /get_state`, returning the bare state name (`"Running"`, not `"State.Running"`).
    pub async fn get_state(&self) -> anyhow::Result<String> {
        let url = format!("{}/get_state", self.base_url());
        let resp: serde_json::Value = reqwest::get(&url).await?.json().await?;
        let state = resp["State"].as_str().unwrap_or_default();
        Ok(state.strip_prefix("State.").unwrap_or(state).to_owned())
    }

    /// Poll `get_state` until it reports `expected` or `timeout` elapses.
    pub async fn wait_for_state(&self, expected: &str, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.get_state().await? == expected {
                return Ok(());
            }
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("node on port {} never reached state {expected}", self.port);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn start(&self, chance_to_fail: f64) -> anyhow::Result<()> {
        let url = format!("{}/change_state", self.base_url());
        reqwest::Client::new().post(&url).query(&[("start", chance_to_fail.to_string())]).send().await?;
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        let url = format!("{}/change_state", self.base_url());
        reqwest::Client::new().post(&url).query(&[("stop", "_")]).send().await?;
        Ok(())
    }

    pub async fn notify(&self, sender_port: &str, state: &str, ts: f64) -> anyhow::Result<()> {
        let url = format!("{}/notification", self.base_url());
        reqwest::Client::new()
            .post(&url)
            .query(&[
                ("state", format!("State.{state}")),
                ("sender", sender_port.to_owned()),
                ("time_stamp", ts.to_string()),
            ])
            .send()
            .await?;
        Ok(())
    }

    pub async fn wait_exit(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("node on port {} did not exit within {timeout:?}", self.port);
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Send `SIGTERM`, the same signal a process manager would send.
    pub fn terminate(&self) -> anyhow::Result<()> {
        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(self.child.id() as i32),
            nix::sys::signal::Signal::SIGTERM,
        )?;
        Ok(())
    }
}

impl Drop for NodeTreeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
