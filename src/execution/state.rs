//! # Execution State
//!
//! The record threaded through the state machine. Every transition consumes
//! a state and returns a new one; nothing mutates a state in place.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::messaging::TaskId;
use crate::plan::{Plan, SkillCall};

/// Outcome of the most recently dispatched task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepVerdict {
    /// Nothing has been dispatched yet
    #[default]
    Unknown,
    Succeeded,
    /// Explicit `FAILED` result, or no matching result before the timeout
    Failed,
}

impl StepVerdict {
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Terminal verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Success,
    Failed,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Nodes of the execution graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorNode {
    /// Dispatch `plan[step]`, or note that the plan is exhausted
    Send,
    /// Block on the result of the outstanding task
    Wait,
    /// Fold the verdict into `step` and `retries`
    Update,
    Success,
    Abort,
}

impl ExecutorNode {
    /// Check if this is a terminal node (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Abort)
    }
}

impl fmt::Display for ExecutorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Wait => write!(f, "wait"),
            Self::Update => write!(f, "update"),
            Self::Success => write!(f, "success"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

impl std::str::FromStr for ExecutorNode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "send" => Ok(Self::Send),
            "wait" => Ok(Self::Wait),
            "update" => Ok(Self::Update),
            "success" => Ok(Self::Success),
            "abort" => Ok(Self::Abort),
            _ => Err(format!("Invalid executor node: {s}")),
        }
    }
}

/// State of one execution run
///
/// Created once per run with [`ExecutionState::new`]. The plan is shared
/// behind an `Arc` so producing a successor state never copies it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionState {
    plan: Arc<Plan>,
    step: usize,
    retries: u32,
    last_ok: StepVerdict,
    current_task_id: Option<TaskId>,
    outcome: Option<RunOutcome>,
}

impl ExecutionState {
    pub fn new(plan: Plan) -> Self {
        Self::from_shared(Arc::new(plan))
    }

    pub fn from_shared(plan: Arc<Plan>) -> Self {
        Self {
            plan,
            step: 0,
            retries: 0,
            last_ok: StepVerdict::Unknown,
            current_task_id: None,
            outcome: None,
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Consecutive failures at the current step
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn last_ok(&self) -> StepVerdict {
        self.last_ok
    }

    pub fn current_task_id(&self) -> Option<TaskId> {
        self.current_task_id
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    /// Every step has succeeded
    pub fn is_plan_exhausted(&self) -> bool {
        self.step >= self.plan.len()
    }

    /// The call at the current step, `None` once the plan is exhausted
    pub fn current_call(&self) -> Option<&SkillCall> {
        self.plan.get(self.step)
    }

    pub fn with_step(self, step: usize) -> Self {
        Self { step, ..self }
    }

    pub fn with_retries(self, retries: u32) -> Self {
        Self { retries, ..self }
    }

    pub fn with_last_ok(self, last_ok: StepVerdict) -> Self {
        Self { last_ok, ..self }
    }

    pub fn with_current_task_id(self, current_task_id: Option<TaskId>) -> Self {
        Self {
            current_task_id,
            ..self
        }
    }

    pub fn with_outcome(self, outcome: RunOutcome) -> Self {
        Self {
            outcome: Some(outcome),
            ..self
        }
    }

    /// Check the structural invariants that must hold on entering `node`
    ///
    /// - `step <= len(plan)`
    /// - `retries <= max_retries` while the run is live; an aborted run
    ///   records the failure that exhausted the budget
    /// - a task id is outstanding only while waiting on it
    /// - an outcome exists only in a terminal node, and matches it
    pub fn check_invariants(&self, node: ExecutorNode, max_retries: u32) -> Result<()> {
        if self.step > self.plan.len() {
            return Err(RelayError::state_transition(format!(
                "step {} beyond plan of length {}",
                self.step,
                self.plan.len()
            )));
        }

        let retry_ceiling = match node {
            ExecutorNode::Abort => max_retries.saturating_add(1),
            _ => max_retries,
        };
        if self.retries > retry_ceiling {
            return Err(RelayError::state_transition(format!(
                "retries {} exceed ceiling {} at {node}",
                self.retries, retry_ceiling
            )));
        }

        let expects_task = node == ExecutorNode::Wait;
        if self.current_task_id.is_some() != expects_task {
            return Err(RelayError::state_transition(format!(
                "current_task_id is {:?} at {node}",
                self.current_task_id
            )));
        }

        let expected_outcome = match node {
            ExecutorNode::Success => Some(RunOutcome::Success),
            ExecutorNode::Abort => Some(RunOutcome::Failed),
            _ => None,
        };
        if self.outcome.is_some() && self.outcome != expected_outcome {
            return Err(RelayError::state_transition(format!(
                "outcome {:?} recorded at {node}",
                self.outcome
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step_plan() -> Plan {
        Plan::new(vec![SkillCall::new("pick"), SkillCall::new("place")])
    }

    #[test]
    fn test_initial_state() {
        let state = ExecutionState::new(two_step_plan());
        assert_eq!(state.step(), 0);
        assert_eq!(state.retries(), 0);
        assert_eq!(state.last_ok(), StepVerdict::Unknown);
        assert_eq!(state.current_task_id(), None);
        assert_eq!(state.outcome(), None);
        assert_eq!(state.current_call().unwrap().skill_name, "pick");
        assert!(state.check_invariants(ExecutorNode::Send, 2).is_ok());
    }

    #[test]
    fn test_builders_leave_original_untouched() {
        let state = ExecutionState::new(two_step_plan());
        let next = state.clone().with_step(1).with_retries(1);
        assert_eq!(state.step(), 0);
        assert_eq!(next.step(), 1);
        assert_eq!(next.retries(), 1);
        assert_eq!(next.current_call().unwrap().skill_name, "place");
    }

    #[test]
    fn test_invariant_violations() {
        let state = ExecutionState::new(two_step_plan());

        assert!(state.clone().with_step(3).check_invariants(ExecutorNode::Send, 2).is_err());
        assert!(state.clone().with_retries(3).check_invariants(ExecutorNode::Send, 2).is_err());
        assert!(state.clone().with_retries(3).check_invariants(ExecutorNode::Abort, 2).is_ok());
        assert!(state.check_invariants(ExecutorNode::Wait, 2).is_err());
        assert!(state
            .clone()
            .with_current_task_id(Some(TaskId::generate()))
            .check_invariants(ExecutorNode::Update, 2)
            .is_err());
        assert!(state
            .with_outcome(RunOutcome::Success)
            .check_invariants(ExecutorNode::Abort, 2)
            .is_err());
    }

    #[test]
    fn test_node_round_trips_through_str() {
        for node in [
            ExecutorNode::Send,
            ExecutorNode::Wait,
            ExecutorNode::Update,
            ExecutorNode::Success,
            ExecutorNode::Abort,
        ] {
            assert_eq!(node.to_string().parse::<ExecutorNode>().unwrap(), node);
        }
        assert!(ExecutorNode::Abort.is_terminal());
        assert!(!ExecutorNode::Update.is_terminal());
    }
}
