//! # Test Utilities
//!
//! Scripted skill executors and in-process worker helpers shared by unit and
//! integration tests. Always compiled, so integration tests and doc tests can
//! reach it.

use std::collections::{HashMap, VecDeque};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{RelayError, Result};
use crate::messaging::{MessageChannel, StreamNames, TaskMessage};
use crate::worker::{SkillExecutor, SkillVerdict, WorkerBridge};

/// Redis URL for integration tests, if one is configured
///
/// Redis-backed tests skip themselves when this returns `None`.
pub fn test_redis_url() -> Option<String> {
    env::var("TEST_REDIS_URL").ok().filter(|url| !url.is_empty())
}

/// Mark the process as a test run unless the caller chose an environment
pub fn setup_test_environment() {
    if env::var("RELAY_ENV").is_err() {
        env::set_var("RELAY_ENV", "test");
    }
}

/// One scripted answer for a skill
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedVerdict {
    Succeed,
    Fail(String),
    /// Succeed, but only after holding the worker for the given time
    SucceedAfter(Duration),
    /// Never answer; the worker stays busy with this task forever
    Silent,
}

/// Skill executor that plays back per-skill verdict queues
///
/// Skills without a script (or whose script ran out) get the default
/// verdict, `Succeed` unless changed.
#[derive(Debug)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedVerdict>>>,
    default: ScriptedVerdict,
    executed: Mutex<Vec<String>>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default: ScriptedVerdict::Succeed,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default(mut self, verdict: ScriptedVerdict) -> Self {
        self.default = verdict;
        self
    }

    /// Queue verdicts for `skill`, consumed one per execution
    pub fn script(
        self,
        skill: impl Into<String>,
        verdicts: impl IntoIterator<Item = ScriptedVerdict>,
    ) -> Self {
        self.scripts
            .lock()
            .entry(skill.into())
            .or_default()
            .extend(verdicts);
        self
    }

    /// Skill names in execution order
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    fn next_verdict(&self, skill: &str) -> ScriptedVerdict {
        self.scripts
            .lock()
            .get_mut(skill)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl SkillExecutor for ScriptedExecutor {
    async fn execute(&self, task: &TaskMessage) -> SkillVerdict {
        self.executed.lock().push(task.skill.clone());

        match self.next_verdict(&task.skill) {
            ScriptedVerdict::Succeed => SkillVerdict::succeeded(),
            ScriptedVerdict::Fail(reason) => SkillVerdict::failed(reason),
            ScriptedVerdict::SucceedAfter(delay) => {
                tokio::time::sleep(delay).await;
                SkillVerdict::succeeded()
            }
            ScriptedVerdict::Silent => std::future::pending().await,
        }
    }
}

/// Worker bridge running on a background task
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<Result<u64>>,
}

impl WorkerHandle {
    /// Ask the worker to stop and wait for it; returns tasks processed
    pub async fn stop(self) -> Result<u64> {
        // The worker may already have exited on an error; its result says why.
        let _ = self.shutdown.send(true);
        self.join
            .await
            .map_err(|e| RelayError::worker(format!("worker task failed: {e}")))?
    }

    /// Drop the worker without waiting (for workers stuck on a silent skill)
    pub fn abort(self) {
        self.join.abort();
    }
}

/// Start a worker bridge on `channel` with a short poll slice
pub async fn spawn_worker<C, E>(
    channel: Arc<C>,
    executor: Arc<E>,
    streams: StreamNames,
) -> Result<WorkerHandle>
where
    C: MessageChannel,
    E: SkillExecutor,
{
    let bridge = WorkerBridge::new(channel, executor, streams, "test_worker")
        .with_poll_slice(Duration::from_millis(100));
    bridge.prepare().await?;

    let (shutdown, rx) = watch::channel(false);
    let join = tokio::spawn(async move { bridge.run(rx).await });
    Ok(WorkerHandle { shutdown, join })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::TaskId;
    use std::collections::BTreeMap;

    fn task(skill: &str) -> TaskMessage {
        TaskMessage::new(TaskId::generate(), skill, BTreeMap::new())
    }

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let executor = ScriptedExecutor::new().script(
            "pour",
            [ScriptedVerdict::Fail("SPILL".into()), ScriptedVerdict::Succeed],
        );

        assert_eq!(executor.execute(&task("pour")).await, SkillVerdict::failed("SPILL"));
        assert!(executor.execute(&task("pour")).await.success);
        assert!(executor.execute(&task("pour")).await.success);
        assert_eq!(executor.executed(), vec!["pour", "pour", "pour"]);
    }

    #[tokio::test]
    async fn test_default_verdict_applies_to_unscripted_skills() {
        let executor = ScriptedExecutor::new().with_default(ScriptedVerdict::Fail("NOPE".into()));
        assert!(!executor.execute(&task("anything")).await.success);
    }
}
