//! # Transition Table
//!
//! Handlers turn one [`ExecutionState`] into the next; routers pick the node
//! that runs after a handler. Both are plain `match` tables over
//! [`ExecutorNode`].
//!
//! ```text
//! SEND ──task dispatched──> WAIT ──> UPDATE ──ok, steps left──> SEND
//!   │                                  │ ──ok, plan done──────> SUCCESS
//!   └──plan exhausted──> UPDATE        │ ──failed, budget left─> SEND (same step)
//!                                      └ ──failed, exhausted──> ABORT
//! ```

use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::messaging::MessageChannel;

use super::dispatcher::TaskDispatcher;
use super::policy::RetryPolicy;
use super::state::{ExecutionState, ExecutorNode, RunOutcome, StepVerdict};
use super::watcher::ResultWatcher;

/// Collaborators the I/O handlers need
pub(crate) struct NodeContext<'a, C: MessageChannel> {
    pub dispatcher: &'a TaskDispatcher<C>,
    pub watcher: &'a ResultWatcher<C>,
    pub policy: &'a RetryPolicy,
}

/// Run the handler registered for `node`
pub(crate) async fn handle_node<C: MessageChannel>(
    node: ExecutorNode,
    state: ExecutionState,
    ctx: &NodeContext<'_, C>,
) -> Result<ExecutionState> {
    match node {
        ExecutorNode::Send => send_step(state, ctx.dispatcher).await,
        ExecutorNode::Wait => wait_step(state, ctx.watcher, ctx.policy.result_timeout).await,
        ExecutorNode::Update => Ok(update_state(state)),
        ExecutorNode::Success => Ok(success_node(state)),
        ExecutorNode::Abort => Ok(abort_node(state)),
    }
}

/// Node that follows `node`; `None` for terminal nodes
pub fn route_from(
    node: ExecutorNode,
    state: &ExecutionState,
    policy: &RetryPolicy,
) -> Option<ExecutorNode> {
    match node {
        ExecutorNode::Send => Some(after_send(state)),
        ExecutorNode::Wait => Some(after_wait(state)),
        ExecutorNode::Update => Some(route(state, policy)),
        ExecutorNode::Success | ExecutorNode::Abort => None,
    }
}

/// Dispatch the current step, or mark the plan complete when nothing is left
pub async fn send_step<C: MessageChannel>(
    state: ExecutionState,
    dispatcher: &TaskDispatcher<C>,
) -> Result<ExecutionState> {
    let Some(call) = state.current_call() else {
        return Ok(state
            .with_last_ok(StepVerdict::Succeeded)
            .with_current_task_id(None));
    };

    let task_id = dispatcher.dispatch(call).await?;
    Ok(state.with_current_task_id(Some(task_id)))
}

/// Wait for the outstanding task; a timeout is recorded as a failure
pub async fn wait_step<C: MessageChannel>(
    state: ExecutionState,
    watcher: &ResultWatcher<C>,
    timeout: Duration,
) -> Result<ExecutionState> {
    let task_id = state
        .current_task_id()
        .ok_or_else(|| RelayError::state_transition("wait entered with no outstanding task"))?;

    let verdict = watcher.await_verdict(task_id, timeout).await?;
    tracing::debug!(task_id = %task_id, step = state.step(), verdict = ?verdict, "Step verdict");

    Ok(state
        .with_last_ok(StepVerdict::from_success(verdict.is_success()))
        .with_current_task_id(None))
}

/// Fold the last verdict into the step counter and retry count
///
/// Success advances `step` (never past the end of the plan) and resets
/// `retries`; anything else counts one more failure at the same step.
pub fn update_state(state: ExecutionState) -> ExecutionState {
    if state.last_ok().is_success() {
        let next = (state.step() + 1).min(state.plan().len());
        state.with_step(next).with_retries(0)
    } else {
        let retries = state.retries().saturating_add(1);
        state.with_retries(retries)
    }
}

pub fn success_node(state: ExecutionState) -> ExecutionState {
    state.with_outcome(RunOutcome::Success)
}

pub fn abort_node(state: ExecutionState) -> ExecutionState {
    state.with_outcome(RunOutcome::Failed)
}

pub fn after_send(state: &ExecutionState) -> ExecutorNode {
    if state.current_task_id().is_some() {
        ExecutorNode::Wait
    } else {
        ExecutorNode::Update
    }
}

pub fn after_wait(_state: &ExecutionState) -> ExecutorNode {
    ExecutorNode::Update
}

/// Decide what follows an update
///
/// A failed step is re-sent until it has failed more than `max_retries`
/// times, so each step gets at most `max_retries + 1` dispatches.
pub fn route(state: &ExecutionState, policy: &RetryPolicy) -> ExecutorNode {
    if state.last_ok().is_success() {
        if state.is_plan_exhausted() {
            ExecutorNode::Success
        } else {
            ExecutorNode::Send
        }
    } else if policy.is_exhausted(state.retries()) {
        ExecutorNode::Abort
    } else {
        ExecutorNode::Send
    }
}
