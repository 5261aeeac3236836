// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction (spec §4.4). The state machine never sees routing
//! keys, URLs, or NATS subjects — it only ever sees [`Effect`](crate::fsm::Effect)s,
//! which `node.rs` turns into calls against this trait. Two implementations
//! are provided, selected at startup by [`crate::config::Architecture`]:
//! [`direct::DirectTransport`] (HTTP request/response) and
//! [`broker::BrokerTransport`] (NATS topics + request/reply RPC).

pub mod broker;
pub mod direct;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Architecture, Config};
use crate::id::NodeId;
use crate::node::NodeHandle;
use crate::state::NodeState;

/// The only surface the state machine's effects are translated through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dispatch `Orange(Running, chance_to_fail)` to `dst`.
    async fn send_start(&self, dst: &NodeId, chance_to_fail: f64) -> anyhow::Result<()>;

    /// Dispatch `Orange(Stopped)` to `dst`.
    async fn send_stop(&self, dst: &NodeId) -> anyhow::Result<()>;

    /// Dispatch `Red(state, sender, ts)` to `dst` (normally the sender's parent).
    async fn send_notification(
        &self,
        dst: &NodeId,
        sender: &NodeId,
        state: NodeState,
        ts: f64,
    ) -> anyhow::Result<()>;

    /// Request `dst`'s current state via `White`/`Blue`.
    async fn get_state(&self, dst: &NodeId) -> anyhow::Result<NodeState>;

    /// Start whatever receiver loop(s) this transport needs (HTTP server,
    /// NATS subscriptions/RPC responder) bound to `handle`'s node, and run
    /// until `shutdown` is cancelled.
    async fn serve(
        self: Arc<Self>,
        handle: Arc<NodeHandle>,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> anyhow::Result<()>;
}

/// Build the configured transport. `architecture` picks the implementation;
/// every other field it needs comes from `config`.
pub async fn build(config: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    match config.architecture_enum()? {
        Architecture::Direct => Ok(Arc::new(direct::DirectTransport::new(config))),
        Architecture::Broker => Ok(Arc::new(broker::BrokerTransport::connect(config).await?)),
    }
}
