// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level process runner — shared by `main` and the integration tests in
//! `tests/specs`. Builds the local `Node`, spawns children, starts the
//! configured transport, and runs until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{parse_address, Config};
use crate::id::NodeId;
use crate::node::{Node, NodeHandle};
use crate::rng::SeededRoll;
use crate::supervisor::Supervisor;
use crate::transport;

/// Initialize tracing/logging from config. Uses `try_init` so it's safe to
/// call more than once (e.g. from integration tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run one node to completion: spawn children, start the transport, signal
/// parent readiness, and block until a shutdown signal cascades through.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);
    config.validate()?;

    let self_id = NodeId::from_port(&config.port.to_string())
        .map_err(|e| anyhow::anyhow!("--port {} is not a valid node id: {e}", config.port))?;
    let parent_id = match &config.parent {
        Some(addr) => {
            let (_, port) = parse_address(addr)?;
            Some(NodeId::from_port(&port.to_string())?)
        }
        None => None,
    };

    let mut supervisor = Supervisor::spawn_children(&config, &self_id)?;

    let roll = Box::new(SeededRoll::from_entropy());
    let node = Node::new(self_id.clone(), config.children, config.levels, roll);
    let transport = transport::build(&config).await?;
    let handle = NodeHandle::new(node, Arc::clone(&transport), parent_id, &config);

    let shutdown = CancellationToken::new();
    let serve_transport = Arc::clone(&transport);
    let serve_handle = Arc::clone(&handle);
    let serve_shutdown = shutdown.clone();
    let serve_task = tokio::spawn(async move { serve_transport.serve(serve_handle, serve_shutdown).await });

    spawn_signal_handler(shutdown.clone());

    // Receivers are bound (or, for direct transport, about to accept
    // connections momentarily — outbound retries absorb the race) so the
    // node can run its local "ready" transition and announce itself.
    handle.ready().await;
    info!("node {self_id} ready (state={})", handle.state().await);

    shutdown.cancelled().await;
    info!("node {self_id} shutting down");

    let shutdown_deadline = Duration::from_secs_f64(config.time_shutdown);
    supervisor.shutdown(shutdown_deadline).await;
    handle.shutdown(shutdown_deadline).await;

    serve_task.abort();
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
