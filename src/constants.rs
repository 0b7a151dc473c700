//! # System Constants
//!
//! Stream names, consumer identities and policy defaults shared by the
//! plan executor and the worker bridge.

use std::time::Duration;

/// Stream and consumer-group names used by the robot bridge protocol
pub mod streams {
    /// Client to worker
    pub const TASK_STREAM: &str = "robot.tasks";
    /// Worker to client
    pub const RESULT_STREAM: &str = "robot.events";

    pub const TASK_GROUP: &str = "ros_bridge";
    pub const RESULT_GROUP: &str = "langgraph";

    pub const CLIENT_CONSUMER: &str = "lg_1";
    pub const WORKER_CONSUMER: &str = "dummy_bridge_1";

    /// Consumer groups start at the beginning of history.
    pub const GROUP_ORIGIN_ID: &str = "0";
}

/// Field names of the task and result stream records
pub mod fields {
    pub const TASK_ID: &str = "task_id";
    pub const SKILL: &str = "skill";
    pub const PARAMS: &str = "params";
    pub const REPLY_TO: &str = "reply_to";
    pub const STATUS: &str = "status";
    pub const REASON: &str = "reason";
}

/// Execution policy defaults
pub mod policy {
    use super::Duration;

    pub const MAX_RETRIES: u32 = 2;
    pub const RESULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const POLL_SLICE: Duration = Duration::from_secs(5);

    /// Results are read one at a time so nothing is left undelivered-but-unacked
    /// when the watcher returns on a match.
    pub const RESULT_READ_COUNT: usize = 1;
    pub const TASK_READ_COUNT: usize = 1;
}

/// Simulated worker defaults
pub mod simulation {
    use super::Duration;

    pub const EXECUTION_TIME: Duration = Duration::from_secs(2);
    pub const FAIL_PROBABILITY: f64 = 0.3;

    /// Skill name that always fails
    pub const FORCED_FAILURE_SKILL: &str = "fail";
    pub const FORCED_FAILURE_REASON: &str = "FORCED_FAILURE";
    pub const SIMULATED_FAILURE_REASON: &str = "SIMULATED_FAILURE";
}
