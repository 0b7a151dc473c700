//! Property-based tests for the executor state machine.
//!
//! Runs the pure transition functions against scripted verdict sequences,
//! with no channel involved, and checks dispatch counts and outcomes.

use proptest::prelude::*;
use skill_relay::execution::machine::{abort_node, route_from, success_node, update_state};
use skill_relay::execution::{ExecutionState, ExecutorNode, RetryPolicy, RunOutcome, StepVerdict};
use skill_relay::messaging::TaskId;
use skill_relay::plan::{Plan, SkillCall};

fn plan_with(len: usize) -> Plan {
    (0..len).map(|i| SkillCall::new(format!("skill_{i}"))).collect()
}

/// Drive a run to completion; step `i` fails `failures[i]` times before succeeding
///
/// Returns the outcome and the step index of every dispatch.
fn simulate(failures: &[u32], max_retries: u32) -> (RunOutcome, Vec<usize>, ExecutionState) {
    let policy = RetryPolicy::default().with_max_retries(max_retries);
    let mut remaining = failures.to_vec();
    let mut state = ExecutionState::new(plan_with(failures.len()));
    let mut node = ExecutorNode::Send;
    let mut dispatched = Vec::new();

    loop {
        state
            .check_invariants(node, max_retries)
            .unwrap_or_else(|e| panic!("invariant broken at {node}: {e}"));

        state = match node {
            ExecutorNode::Send if state.is_plan_exhausted() => {
                state.with_last_ok(StepVerdict::Succeeded)
            }
            ExecutorNode::Send => {
                dispatched.push(state.step());
                state.with_current_task_id(Some(TaskId::generate()))
            }
            ExecutorNode::Wait => {
                let left = &mut remaining[state.step()];
                let ok = *left == 0;
                *left = left.saturating_sub(1);
                state
                    .with_last_ok(StepVerdict::from_success(ok))
                    .with_current_task_id(None)
            }
            ExecutorNode::Update => update_state(state),
            ExecutorNode::Success => success_node(state),
            ExecutorNode::Abort => abort_node(state),
        };

        match route_from(node, &state, &policy) {
            Some(next) => node = next,
            None => break,
        }
    }

    let outcome = state.outcome().expect("terminal node records an outcome");
    (outcome, dispatched, state)
}

fn expected_dispatches(failures: &[u32], max_retries: u32) -> (RunOutcome, Vec<usize>) {
    let mut steps = Vec::new();
    for (step, &fails) in failures.iter().enumerate() {
        if fails > max_retries {
            steps.extend(std::iter::repeat(step).take(max_retries as usize + 1));
            return (RunOutcome::Failed, steps);
        }
        steps.extend(std::iter::repeat(step).take(fails as usize + 1));
    }
    (RunOutcome::Success, steps)
}

proptest! {
    /// Property: a plan whose steps all succeed dispatches each step once, in order
    #[test]
    fn all_success_dispatches_each_step_once(len in 0usize..12, max_retries in 0u32..4) {
        let (outcome, dispatched, state) = simulate(&vec![0; len], max_retries);

        prop_assert_eq!(outcome, RunOutcome::Success);
        prop_assert_eq!(dispatched, (0..len).collect::<Vec<_>>());
        prop_assert_eq!(state.step(), len);
        prop_assert_eq!(state.retries(), 0);
    }

    /// Property: dispatch sequence and outcome follow the retry budget exactly
    #[test]
    fn dispatches_follow_retry_budget(
        failures in prop::collection::vec(0u32..5, 0..8),
        max_retries in 0u32..4,
    ) {
        let (outcome, dispatched, _) = simulate(&failures, max_retries);
        let (expected_outcome, expected_steps) = expected_dispatches(&failures, max_retries);

        prop_assert_eq!(outcome, expected_outcome);
        prop_assert_eq!(dispatched, expected_steps);
    }

    /// Property: no step is ever dispatched more than max_retries + 1 times
    #[test]
    fn per_step_dispatches_bounded(
        failures in prop::collection::vec(0u32..6, 1..8),
        max_retries in 0u32..4,
    ) {
        let (_, dispatched, state) = simulate(&failures, max_retries);

        for step in 0..failures.len() {
            let count = dispatched.iter().filter(|&&s| s == step).count();
            prop_assert!(count <= max_retries as usize + 1);
        }
        prop_assert!(state.step() <= failures.len());
    }

    /// Property: an aborted run stops at the step that exhausted its budget
    #[test]
    fn abort_stops_at_exhausted_step(
        prefix in 0usize..5,
        max_retries in 0u32..4,
    ) {
        let mut failures = vec![0; prefix];
        failures.push(max_retries + 1);
        failures.push(0);

        let (outcome, dispatched, state) = simulate(&failures, max_retries);

        prop_assert_eq!(outcome, RunOutcome::Failed);
        prop_assert_eq!(state.step(), prefix);
        prop_assert_eq!(state.retries(), max_retries + 1);
        prop_assert!(!dispatched.contains(&(prefix + 1)));
    }
}
