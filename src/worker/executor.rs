//! Skill execution seam of the worker bridge.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::info;

use crate::config::WorkerConfig;
use crate::constants::simulation;
use crate::messaging::{ResultMessage, TaskId, TaskMessage};

/// Binary verdict for one executed skill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillVerdict {
    pub success: bool,
    /// Opaque detail forwarded to the client untouched
    pub reason: Option<String>,
}

impl SkillVerdict {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
        }
    }

    pub fn into_result(self, task_id: TaskId) -> ResultMessage {
        if self.success {
            ResultMessage::success(task_id)
        } else {
            ResultMessage::failed(task_id, self.reason)
        }
    }
}

/// Runs a skill and reports whether it worked
///
/// Called once per task, one task at a time. Implementations that actuate
/// hardware block until the action has finished.
#[async_trait]
pub trait SkillExecutor: Send + Sync + 'static {
    async fn execute(&self, task: &TaskMessage) -> SkillVerdict;
}

/// Stand-in for a robot: waits, then fails at random
///
/// The skill named `fail` always fails, which makes retry paths easy to
/// exercise end to end.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    execution_time: Duration,
    fail_probability: f64,
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(simulation::EXECUTION_TIME, simulation::FAIL_PROBABILITY)
    }
}

impl SimulatedExecutor {
    pub fn new(execution_time: Duration, fail_probability: f64) -> Self {
        let fail_probability = if fail_probability.is_finite() {
            fail_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            execution_time,
            fail_probability,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.execution_time(), config.fail_probability)
    }

    pub fn fail_probability(&self) -> f64 {
        self.fail_probability
    }
}

#[async_trait]
impl SkillExecutor for SimulatedExecutor {
    async fn execute(&self, task: &TaskMessage) -> SkillVerdict {
        info!(
            task_id = %task.task_id,
            skill = %task.skill,
            params = ?task.params,
            "Simulating skill"
        );
        tokio::time::sleep(self.execution_time).await;

        if task.skill == simulation::FORCED_FAILURE_SKILL {
            return SkillVerdict::failed(simulation::FORCED_FAILURE_REASON);
        }

        let failed = rand::thread_rng().gen_bool(self.fail_probability);
        if failed {
            SkillVerdict::failed(simulation::SIMULATED_FAILURE_REASON)
        } else {
            SkillVerdict::succeeded()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn task(skill: &str) -> TaskMessage {
        TaskMessage::new(TaskId::generate(), skill, BTreeMap::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_failure_skill() {
        let executor = SimulatedExecutor::new(Duration::from_secs(2), 0.0);
        let verdict = executor.execute(&task("fail")).await;
        assert_eq!(verdict, SkillVerdict::failed("FORCED_FAILURE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probability_bounds() {
        let never = SimulatedExecutor::new(Duration::ZERO, 0.0);
        let always = SimulatedExecutor::new(Duration::ZERO, 1.0);
        for _ in 0..20 {
            assert!(never.execute(&task("pick")).await.success);
            assert_eq!(
                always.execute(&task("pick")).await.reason.as_deref(),
                Some("SIMULATED_FAILURE")
            );
        }
    }

    #[test]
    fn test_probability_is_clamped() {
        assert_eq!(SimulatedExecutor::new(Duration::ZERO, 7.0).fail_probability(), 1.0);
        assert_eq!(SimulatedExecutor::new(Duration::ZERO, f64::NAN).fail_probability(), 0.0);
    }

    #[test]
    fn test_verdict_into_result() {
        let task_id = TaskId::generate();
        let result = SkillVerdict::failed("GRIPPER_JAM").into_result(task_id);
        assert_eq!(result, ResultMessage::failed(task_id, Some("GRIPPER_JAM".into())));
        assert_eq!(
            SkillVerdict::succeeded().into_result(task_id),
            ResultMessage::success(task_id)
        );
    }
}
