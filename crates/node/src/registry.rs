// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-parent bookkeeping of direct children's latest reported state.

use crate::id::NodeId;
use crate::state::NodeState;

/// The latest known state of one direct child, keyed by construction order
/// (child index `1..=arity`), not by arrival order of notifications.
#[derive(Debug, Clone)]
pub struct ChildRecord {
    pub id: NodeId,
    /// `None` until the child's first notification arrives ("uninitialised").
    pub last_state: Option<NodeState>,
    pub last_ts: f64,
}

/// Ordered mapping from child id to its latest `(state, timestamp)`.
///
/// Entries are fixed at construction time (one per child produced by
/// [`NodeId::children`]); the registry never grows or shrinks afterwards.
#[derive(Debug, Clone)]
pub struct ChildRegistry {
    children: Vec<ChildRecord>,
}

impl ChildRegistry {
    /// Build a registry with one uninitialised entry per `child_ids`, in
    /// the given (construction) order.
    pub fn new(child_ids: Vec<NodeId>) -> Self {
        let children = child_ids
            .into_iter()
            .map(|id| ChildRecord { id, last_state: None, last_ts: 0.0 })
            .collect();
        Self { children }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn records(&self) -> &[ChildRecord] {
        &self.children
    }

    /// Apply a notification from `child_id`. Returns `true` iff it was
    /// fresher than the previously recorded timestamp for that child and
    /// the registry was mutated; returns `false` for a stale (`ts <=
    /// last_ts`) or unknown sender, leaving the registry untouched.
    pub fn update(&mut self, child_id: &NodeId, state: NodeState, ts: f64) -> bool {
        let Some(record) = self.children.iter_mut().find(|c| &c.id == child_id) else {
            return false;
        };
        if ts <= record.last_ts {
            return false;
        }
        record.last_state = Some(state);
        record.last_ts = ts;
        true
    }

    /// Priority-ordered reduction of the latest child states into a single
    /// aggregate state, per the rule: Error > uninitialised > Stopped >
    /// Starting > (all Running).
    pub fn aggregate(&self) -> NodeState {
        let mut error = 0;
        let mut uninitialised = 0;
        let mut stopped = 0;
        let mut starting = 0;
        let mut running = 0;

        for child in &self.children {
            match child.last_state {
                None => uninitialised += 1,
                Some(NodeState::Error) => error += 1,
                Some(NodeState::Stopped) => stopped += 1,
                Some(NodeState::Starting) => starting += 1,
                Some(NodeState::Running) => running += 1,
                Some(NodeState::Initialisation) => uninitialised += 1,
            }
        }

        if error >= 1 {
            NodeState::Error
        } else if uninitialised >= 1 {
            NodeState::Initialisation
        } else if stopped >= 1 {
            NodeState::Stopped
        } else if starting >= 1 {
            NodeState::Starting
        } else if running == self.children.len() {
            NodeState::Running
        } else {
            // Unreachable given the counts above exhaust `self.children.len()`,
            // but keep a conservative fallback rather than panicking.
            NodeState::Initialisation
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
