// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The six end-to-end scenarios from spec.md §8, run against real
//! `nodetree` subprocesses over the direct transport.

use std::time::Duration;

use nodetree_specs::NodeTreeProcess;
use serial_test::serial;

const READY: Duration = Duration::from_secs(5);

/// Every port in a D=2, A=3 realm rooted at 20000: the root, its 3
/// children, and each child's 3 grandchildren.
fn full_tree_ports() -> Vec<u16> {
    let mut ports = vec![20000, 21000, 22000, 23000];
    for branch in [21000, 22000, 23000] {
        for k in 1..=3 {
            ports.push(branch + 100 * k);
        }
    }
    ports
}

async fn get_port_state(port: u16) -> anyhow::Result<String> {
    let url = format!("http://127.0.0.1:{port}/get_state");
    let body: serde_json::Value = reqwest::get(&url).await?.json().await?;
    let state = body["State"].as_str().unwrap_or_default();
    Ok(state.strip_prefix("State.").unwrap_or(state).to_owned())
}

async fn post_start(port: u16, chance_to_fail: f64) -> anyhow::Result<()> {
    let url = format!("http://127.0.0.1:{port}/change_state");
    reqwest::Client::new().post(&url).query(&[("start", chance_to_fail.to_string())]).send().await?;
    Ok(())
}

async fn wait_port_state(port: u16, expected: &str, timeout: Duration) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if get_port_state(port).await? == expected {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("port {port} never reached {expected}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
#[serial]
async fn boot_to_stopped() -> anyhow::Result<()> {
    let root = NodeTreeProcess::at_port(20000).levels(2).children(3).spawn()?;
    root.wait_healthy(READY).await?;

    for port in full_tree_ports() {
        wait_port_state(port, "Stopped", READY).await?;
    }
    Ok(())
}

#[tokio::test]
#[serial]
async fn single_leaf_start_never_fails() -> anyhow::Result<()> {
    let leaf = NodeTreeProcess::at_port(30000).levels(0).time_starting(1.0).spawn()?;
    leaf.wait_healthy(READY).await?;
    leaf.wait_for_state("Stopped", READY).await?;

    leaf.start(0.0).await?;
    leaf.wait_for_state("Running", Duration::from_secs(3)).await?;

    // One running_interval later, p=0 never rolls a failure.
    tokio::time::sleep(Duration::from_secs(5)).await;
    anyhow::ensure!(leaf.get_state().await? == "Running");
    Ok(())
}

#[tokio::test]
#[serial]
async fn single_leaf_start_always_fails() -> anyhow::Result<()> {
    let leaf = NodeTreeProcess::at_port(30001).levels(0).time_starting(1.0).spawn()?;
    leaf.wait_healthy(READY).await?;
    leaf.wait_for_state("Stopped", READY).await?;

    leaf.start(1.0).await?;
    leaf.wait_for_state("Error", Duration::from_secs(3)).await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn single_leaf_stop_returns_to_stopped() -> anyhow::Result<()> {
    let leaf = NodeTreeProcess::at_port(30002).levels(0).time_starting(1.0).spawn()?;
    leaf.wait_healthy(READY).await?;
    leaf.wait_for_state("Stopped", READY).await?;

    leaf.start(0.0).await?;
    leaf.wait_for_state("Running", Duration::from_secs(3)).await?;

    leaf.stop().await?;
    leaf.wait_for_state("Stopped", Duration::from_secs(3)).await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn subtree_failure_propagates_to_root_only_through_its_branch() -> anyhow::Result<()> {
    let root = NodeTreeProcess::at_port(20000).levels(2).children(3).time_starting(1.0).spawn()?;
    root.wait_healthy(READY).await?;
    for port in full_tree_ports() {
        wait_port_state(port, "Stopped", READY).await?;
    }

    // Root already spawned the full subtree; 21000 is one of its children.
    post_start(21000, 1.0).await?;

    let settle = Duration::from_secs(4); // 2*starting + 1s of slack
    wait_port_state(21000, "Error", settle).await?;
    for leaf in [21100, 21200, 21300] {
        wait_port_state(leaf, "Error", settle).await?;
    }
    wait_port_state(20000, "Error", settle).await?;

    for sibling in [22000, 23000] {
        anyhow::ensure!(get_port_state(sibling).await? == "Stopped");
        for leaf in [sibling + 100, sibling + 200, sibling + 300] {
            anyhow::ensure!(get_port_state(leaf).await? == "Stopped");
        }
    }
    Ok(())
}

#[tokio::test]
#[serial]
async fn stale_notification_is_ignored() -> anyhow::Result<()> {
    let root = NodeTreeProcess::at_port(40000).levels(1).children(3).spawn()?;
    root.wait_healthy(READY).await?;
    root.wait_for_state("Stopped", READY).await?;

    root.notify("41000", "Stopped", 5.0).await?;
    root.notify("41000", "Running", 3.0).await?;

    // Whichever of root's own children already reported in, a strictly
    // smaller timestamp must never overwrite a later one — root stays
    // Stopped for as long as all three children do.
    tokio::time::sleep(Duration::from_millis(200)).await;
    anyhow::ensure!(root.get_state().await? == "Stopped");
    Ok(())
}
