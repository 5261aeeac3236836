// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Node`: the mutable runtime state for one process, owning the
//! [`StateMachine`] and [`ChildRegistry`] and turning [`Effect`]s into
//! transport calls. Lives behind a single `tokio::sync::Mutex` on the node's
//! main task; inbound requests from either transport are marshaled in
//! through plain async method calls rather than touched directly by a
//! transport handler task.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::envelope::Orange;
use crate::fsm::{Effect, StateMachine};
use crate::id::NodeId;
use crate::registry::ChildRegistry;
use crate::rng::FailRoll;
use crate::state::NodeState;
use crate::transport::Transport;

/// One node's full runtime state: identity, topology, FSM, and child
/// bookkeeping, per spec §3's `Node` data model.
pub struct Node {
    pub id: NodeId,
    pub tree_arity: u8,
    pub tree_depth: u8,
    fsm: StateMachine,
    registry: ChildRegistry,
    roll: Box<dyn FailRoll>,
}

impl Node {
    pub fn new(id: NodeId, tree_arity: u8, tree_depth: u8, roll: Box<dyn FailRoll>) -> Self {
        let has_children = id.depth() < tree_depth;
        let child_ids = if has_children { id.children(tree_arity).unwrap_or_default() } else { Vec::new() };
        let registry = ChildRegistry::new(child_ids);
        Self { id, tree_arity, tree_depth, fsm: StateMachine::new(has_children), registry, roll }
    }

    pub fn state(&self) -> NodeState {
        self.fsm.state()
    }

    pub fn has_children(&self) -> bool {
        !self.registry.is_empty()
    }

    pub fn child_ids(&self) -> Vec<NodeId> {
        self.registry.records().iter().map(|r| r.id.clone()).collect()
    }
}

/// Wraps a [`Node`] plus the resources its event loop needs: the transport
/// used to reach parent/children, and this node's own address within the
/// realm (used to populate outgoing `Red` timestamps and addressing).
pub struct NodeHandle {
    node: Mutex<Node>,
    transport: Arc<dyn Transport>,
    parent: Option<NodeId>,
    time_starting: Duration,
    time_running: Duration,
}

impl NodeHandle {
    pub fn new(
        node: Node,
        transport: Arc<dyn Transport>,
        parent: Option<NodeId>,
        config: &Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            node: Mutex::new(node),
            transport,
            parent,
            time_starting: Duration::from_secs_f64(config.time_starting),
            time_running: Duration::from_secs_f64(config.time_running),
        })
    }

    pub async fn state(&self) -> NodeState {
        self.node.lock().await.state()
    }

    pub async fn id(&self) -> NodeId {
        self.node.lock().await.id.clone()
    }

    /// Run the local "ready" transition and apply its effects. Called once
    /// at startup after the transport receiver is bound and listening.
    pub async fn ready(self: &Arc<Self>) {
        let effects = self.node.lock().await.fsm.ready();
        self.apply(effects).await;
    }

    /// Handle an inbound `StartCmd(p)`.
    pub async fn start(self: &Arc<Self>, chance_to_fail: f64) {
        let result = self.node.lock().await.fsm.start(chance_to_fail);
        match result {
            Ok(effects) => {
                self.apply(effects).await;
                self.schedule_starting_timeout();
            }
            Err(e) => warn!("rejected StartCmd: {e}"),
        }
    }

    /// Handle an inbound `StopCmd`.
    pub async fn stop(self: &Arc<Self>) {
        let result = self.node.lock().await.fsm.stop();
        match result {
            Ok(effects) => self.apply(effects).await,
            Err(e) => warn!("rejected StopCmd: {e}"),
        }
    }

    /// Handle a child notification arriving over either transport.
    pub async fn child_notify(self: &Arc<Self>, child_id: &NodeId, state: NodeState, ts: f64) {
        let mut guard = self.node.lock().await;
        let node = &mut *guard;
        let effects = node.fsm.child_notify(&mut node.registry, child_id, state, ts);
        drop(guard);
        self.apply(effects).await;
    }

    fn schedule_starting_timeout(self: &Arc<Self>) {
        let handle = Arc::clone(self);
        let delay = self.time_starting;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut guard = handle.node.lock().await;
            let leaf = !guard.has_children();
            let node = &mut *guard;
            let effects = node.fsm.starting_timeout(node.roll.as_mut());
            let now_running = node.fsm.state() == NodeState::Running;
            drop(guard);
            handle.apply(effects).await;
            if leaf && now_running {
                handle.schedule_running_tick();
            }
        });
    }

    fn schedule_running_tick(self: &Arc<Self>) {
        let handle = Arc::clone(self);
        let interval = self.time_running;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let mut guard = handle.node.lock().await;
                if guard.fsm.state() != NodeState::Running {
                    return;
                }
                let node = &mut *guard;
                let effects = node.fsm.tick(node.roll.as_mut());
                let stopped_failing = node.fsm.state() != NodeState::Running;
                drop(guard);
                handle.apply(effects).await;
                if stopped_failing {
                    return;
                }
            }
        });
    }

    /// Translate [`Effect`]s into transport calls, firing child dispatch
    /// concurrently and awaiting nothing from the caller's perspective
    /// beyond this function returning.
    async fn apply(self: &Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::NotifyParent(state) => self.notify_parent(state).await,
                Effect::SendToChildren(orange) => self.dispatch_to_children(orange).await,
            }
        }
    }

    async fn notify_parent(self: &Arc<Self>, state: NodeState) {
        let Some(ref parent) = self.parent else {
            debug!("realm root reached state {state}, no parent to notify");
            return;
        };
        let (id, ts) = {
            let guard = self.node.lock().await;
            (guard.id.clone(), now_seconds())
        };
        if let Err(e) = self.transport.send_notification(parent, &id, state, ts).await {
            warn!("failed to notify parent of {state}: {e:#}");
        }
    }

    async fn dispatch_to_children(self: &Arc<Self>, orange: Orange) {
        let children = self.node.lock().await.child_ids();
        for child in children {
            let transport = Arc::clone(&self.transport);
            let orange = orange.clone();
            tokio::spawn(async move {
                let result = if orange.name == "Running" {
                    transport.send_start(&child, orange.chance_to_fail.unwrap_or(0.0)).await
                } else {
                    transport.send_stop(&child).await
                };
                if let Err(e) = result {
                    warn!("failed to dispatch {} to {child}: {e:#}", orange.name);
                }
            });
        }
    }

    /// Propagate `StopCmd` to every child and wait up to `deadline` for the
    /// registry to settle to `Stopped`, used by cascading shutdown.
    pub async fn shutdown(self: &Arc<Self>, deadline: Duration) {
        self.stop().await;
        let start = tokio::time::Instant::now();
        while self.state().await != NodeState::Stopped {
            if start.elapsed() >= deadline {
                warn!("shutdown deadline exceeded waiting for children to stop");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        info!("node {} shut down", self.id().await);
    }
}

fn now_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
