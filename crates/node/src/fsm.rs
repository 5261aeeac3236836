// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-node state machine (spec §4.2). `StateMachine` owns no I/O: every
//! transition is a pure function from `(current state, input)` to `(new
//! state, effects)`, where an [`Effect`] is something the caller (the node's
//! async event loop, see `node.rs`) must turn into a transport call or a
//! scheduled timer. This keeps the machine itself synchronous and trivially
//! unit-testable without a runtime.

use crate::envelope::Orange;
use crate::id::NodeId;
use crate::registry::ChildRegistry;
use crate::rng::FailRoll;
use crate::state::NodeState;

/// Something the caller must do as a consequence of a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a `Red(state, self, now)` notification to the parent.
    NotifyParent(NodeState),
    /// Dispatch this `Orange` to every child.
    SendToChildren(Orange),
}

/// `(current_state, rejected_input)` pair that does not appear in the
/// transition table, e.g. `StartCmd` while `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: NodeState,
    pub input: &'static str,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} does not accept {}", self.from, self.input)
    }
}

impl std::error::Error for InvalidTransition {}

/// The per-node finite-state machine. `has_children` is fixed at
/// construction (nodes never gain or lose children at runtime) and decides
/// whether `Starting`/`Stopped` transitions propagate `Orange` to children
/// or resolve locally via a fail-roll.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: NodeState,
    chance_to_fail: f64,
    has_children: bool,
}

impl StateMachine {
    pub fn new(has_children: bool) -> Self {
        Self { state: NodeState::Initialisation, chance_to_fail: 0.0, has_children }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn chance_to_fail(&self) -> f64 {
        self.chance_to_fail
    }

    /// Local "ready" transition, run once at process start. Leaves settle
    /// directly into `Stopped`; interior nodes remain in `Initialisation`
    /// until their children report in. Either way the resulting state is
    /// announced to the parent so aggregation upstream is correct from the
    /// first notification onward.
    pub fn ready(&mut self) -> Vec<Effect> {
        if !self.has_children {
            self.state = NodeState::Stopped;
        }
        vec![Effect::NotifyParent(self.state)]
    }

    /// `StartCmd(p)`. Transitions `Stopped -> Starting` and records
    /// `chance_to_fail`; the caller is responsible for scheduling the
    /// `transition_time` delay and then calling [`Self::starting_timeout`].
    pub fn start(&mut self, chance_to_fail: f64) -> Result<Vec<Effect>, InvalidTransition> {
        match self.state {
            NodeState::Stopped => {
                self.state = NodeState::Starting;
                self.chance_to_fail = chance_to_fail;
                Ok(vec![])
            }
            NodeState::Error => Ok(vec![]),
            other => Err(InvalidTransition { from: other, input: "StartCmd" }),
        }
    }

    /// Fires once `transition_time` has elapsed after [`Self::start`].
    /// Interior nodes dispatch `Orange(Running, p)` to every child and wait
    /// for their aggregate to settle; leaves run the fail-roll directly.
    pub fn starting_timeout(&mut self, roll: &mut dyn FailRoll) -> Vec<Effect> {
        if self.state != NodeState::Starting {
            return vec![];
        }
        if self.has_children {
            vec![Effect::SendToChildren(Orange::running(self.chance_to_fail))]
        } else {
            let r = roll.roll();
            self.state = if r < self.chance_to_fail { NodeState::Error } else { NodeState::Running };
            vec![Effect::NotifyParent(self.state)]
        }
    }

    /// `StopCmd`. Interior nodes propagate `Orange(Stopped)` and wait for
    /// the aggregate to settle to `Stopped`; leaves transition immediately.
    pub fn stop(&mut self) -> Result<Vec<Effect>, InvalidTransition> {
        match self.state {
            NodeState::Stopped | NodeState::Error => Ok(vec![]),
            NodeState::Running => {
                if self.has_children {
                    Ok(vec![Effect::SendToChildren(Orange::stopped())])
                } else {
                    self.state = NodeState::Stopped;
                    Ok(vec![Effect::NotifyParent(self.state)])
                }
            }
            other => Err(InvalidTransition { from: other, input: "StopCmd" }),
        }
    }

    /// Internal tick of the `Running` fail-roll loop (leaves only; the
    /// caller never schedules this for interior nodes).
    pub fn tick(&mut self, roll: &mut dyn FailRoll) -> Vec<Effect> {
        if self.state != NodeState::Running {
            return vec![];
        }
        let r = roll.roll();
        if r < self.chance_to_fail {
            self.state = NodeState::Error;
            vec![Effect::NotifyParent(self.state)]
        } else {
            vec![]
        }
    }

    /// A notification from a child arrived. Updates `registry`, and if the
    /// resulting aggregate differs from this node's own current state,
    /// adopts it and notifies the parent. Stale or unknown-sender
    /// notifications (rejected by `registry.update`) and anything while
    /// sticky in `Error` are no-ops.
    pub fn child_notify(
        &mut self,
        registry: &mut ChildRegistry,
        child_id: &NodeId,
        state: NodeState,
        ts: f64,
    ) -> Vec<Effect> {
        if self.state == NodeState::Error {
            return vec![];
        }
        if !registry.update(child_id, state, ts) {
            return vec![];
        }
        let aggregate = registry.aggregate();
        if aggregate == self.state {
            return vec![];
        }
        self.state = aggregate;
        vec![Effect::NotifyParent(self.state)]
    }
}

#[cfg(test)]
#[path = "fsm_tests.rs"]
mod tests;
