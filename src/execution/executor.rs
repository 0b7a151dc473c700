//! # Plan Executor
//!
//! Drives one plan from `SEND` to a terminal node over the transition table
//! in [`machine`](super::machine).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::log_run;
use crate::messaging::{MessageChannel, StreamNames, TaskId};
use crate::plan::Plan;

use super::dispatcher::TaskDispatcher;
use super::machine::{handle_node, route_from, NodeContext};
use super::policy::{ResultRouting, RetryPolicy};
use super::state::{ExecutionState, ExecutorNode, RunOutcome};
use super::watcher::ResultWatcher;

/// One task published during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub step: usize,
    pub skill_name: String,
    pub task_id: TaskId,
}

/// Everything a caller learns from a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub final_state: ExecutionState,
    /// Tasks in dispatch order
    pub dispatches: Vec<DispatchRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Skill names in dispatch order, retries included
    pub fn dispatched_skills(&self) -> Vec<&str> {
        self.dispatches
            .iter()
            .map(|d| d.skill_name.as_str())
            .collect()
    }
}

/// Executes validated plans against a message channel
///
/// ```
/// use std::sync::Arc;
/// use skill_relay::execution::PlanExecutor;
/// use skill_relay::messaging::{InMemoryChannel, StreamNames};
/// use skill_relay::plan::{Plan, SkillCall};
/// use skill_relay::test_utils::{spawn_worker, ScriptedExecutor};
///
/// # tokio_test::block_on(async {
/// let channel = Arc::new(InMemoryChannel::new());
/// let worker = spawn_worker(
///     Arc::clone(&channel),
///     Arc::new(ScriptedExecutor::new()),
///     StreamNames::default(),
/// )
/// .await?;
///
/// let executor = PlanExecutor::new(channel, StreamNames::default(), "lg_1");
/// let report = executor
///     .invoke(Plan::new(vec![SkillCall::new("home")]))
///     .await?;
/// assert!(report.is_success());
///
/// worker.stop().await?;
/// # Ok::<(), skill_relay::RelayError>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct PlanExecutor<C: MessageChannel> {
    channel: Arc<C>,
    streams: StreamNames,
    consumer: String,
    policy: RetryPolicy,
    routing: ResultRouting,
    /// Delete the run-scoped result stream once a `PerRun` run finishes
    cleanup_run_streams: bool,
}

impl<C: MessageChannel> PlanExecutor<C> {
    pub fn new(channel: Arc<C>, streams: StreamNames, consumer: impl Into<String>) -> Self {
        Self {
            channel,
            streams,
            consumer: consumer.into(),
            policy: RetryPolicy::default(),
            routing: ResultRouting::Shared,
            cleanup_run_streams: false,
        }
    }

    pub fn from_config(channel: Arc<C>, config: &RelayConfig) -> Self {
        Self::new(
            channel,
            config.streams.stream_names(),
            config.streams.client_consumer.clone(),
        )
        .with_policy(config.executor.retry_policy())
        .with_routing(config.executor.result_routing)
        .with_run_stream_cleanup(config.executor.cleanup_run_streams)
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_routing(mut self, routing: ResultRouting) -> Self {
        self.routing = routing;
        self
    }

    /// Remove each run's result stream after its terminal node (`PerRun` only)
    ///
    /// A result the worker publishes after the run ended recreates the stream
    /// without a group, so this bounds the key count only for well-behaved
    /// workers.
    pub fn with_run_stream_cleanup(mut self, enabled: bool) -> Self {
        self.cleanup_run_streams = enabled;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn streams(&self) -> &StreamNames {
        &self.streams
    }

    /// Create the task and result consumer groups
    pub async fn prepare(&self) -> Result<()> {
        self.channel
            .ensure_groups(&self.streams.group_bindings())
            .await?;
        Ok(())
    }

    /// Run `plan` to a terminal node
    ///
    /// Always ends in `SUCCESS` or `FAILED` unless the channel fails, in which
    /// case the error ends the run and no outcome is produced.
    pub async fn invoke(&self, plan: Plan) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let result_stream = match self.routing {
            ResultRouting::Shared => self.streams.result_stream.clone(),
            ResultRouting::PerRun => self.streams.run_result_stream(&run_id),
        };
        self.channel
            .ensure_group(&result_stream, &self.streams.result_group)
            .await?;

        let mut dispatcher =
            TaskDispatcher::new(Arc::clone(&self.channel), &self.streams.task_stream);
        if self.routing == ResultRouting::PerRun {
            dispatcher = dispatcher.with_reply_to(result_stream.clone());
        }
        let watcher = ResultWatcher::new(
            Arc::clone(&self.channel),
            result_stream.clone(),
            self.streams.result_group.clone(),
            self.consumer.clone(),
            self.policy.poll_slice,
        );
        let ctx = NodeContext {
            dispatcher: &dispatcher,
            watcher: &watcher,
            policy: &self.policy,
        };

        log_run!(info, "STARTED",
            run_id: run_id,
            steps: plan.len(),
            result_stream: result_stream,
            routing: self.routing
        );

        let mut state = ExecutionState::new(plan);
        let mut node = ExecutorNode::Send;
        let mut dispatches = Vec::new();

        loop {
            state.check_invariants(node, self.policy.max_retries)?;
            state = handle_node(node, state, &ctx).await?;

            if node == ExecutorNode::Send {
                let dispatched = (state.current_task_id(), state.current_call());
                if let (Some(task_id), Some(call)) = dispatched {
                    log_run!(info, "DISPATCHED",
                        run_id: run_id,
                        step: state.step(),
                        skill: call.skill_name,
                        task_id: task_id,
                        retries: state.retries()
                    );
                    dispatches.push(DispatchRecord {
                        step: state.step(),
                        skill_name: call.skill_name.clone(),
                        task_id,
                    });
                }
            }

            match route_from(node, &state, &self.policy) {
                Some(next) => {
                    tracing::trace!(run_id = %run_id, from = %node, to = %next, "Transition");
                    node = next;
                }
                None => break,
            }
        }

        let outcome = state.outcome().ok_or_else(|| {
            RelayError::state_transition(format!("run ended at {node} without an outcome"))
        })?;

        log_run!(info, "FINISHED",
            run_id: run_id,
            outcome: outcome,
            step: state.step(),
            dispatches: dispatches.len()
        );

        if self.routing == ResultRouting::PerRun {
            self.release_run_stream(run_id, &result_stream).await?;
        }

        Ok(RunReport {
            run_id,
            outcome,
            final_state: state,
            dispatches,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn release_run_stream(&self, run_id: Uuid, result_stream: &str) -> Result<()> {
        if !self.cleanup_run_streams {
            debug!(
                run_id = %run_id,
                stream = %result_stream,
                "Run-scoped result stream retained"
            );
            return Ok(());
        }

        let removed = self.channel.delete_stream(result_stream).await?;
        debug!(
            run_id = %run_id,
            stream = %result_stream,
            removed,
            "Run-scoped result stream deleted"
        );
        Ok(())
    }
}
