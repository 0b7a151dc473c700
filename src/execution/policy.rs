//! Retry and result-routing policy for plan execution.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::policy;

/// Bounds on how long and how often one step may be attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-dispatches allowed after a step's first failed attempt
    ///
    /// A step is dispatched at most `max_retries + 1` times.
    pub max_retries: u32,

    /// Total wait for a matching result before the attempt counts as failed
    pub result_timeout: Duration,

    /// Upper bound on one blocking read of the result stream
    pub poll_slice: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: policy::MAX_RETRIES,
            result_timeout: policy::RESULT_TIMEOUT,
            poll_slice: policy::POLL_SLICE,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    pub fn with_poll_slice(mut self, slice: Duration) -> Self {
        self.poll_slice = slice;
        self
    }

    /// Dispatches allowed for one step
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether a step that has failed `failures` times must be abandoned
    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures > self.max_retries
    }
}

/// Where a run's results are published and read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultRouting {
    /// Every run reads the configured result stream and discards foreign results
    #[default]
    Shared,

    /// Each run reads its own `<result_stream>.<run_id>` stream, named in the
    /// task's `reply_to` field
    PerRun,
}

impl fmt::Display for ResultRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::PerRun => write!(f, "per_run"),
        }
    }
}

impl std::str::FromStr for ResultRouting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(Self::Shared),
            "per_run" => Ok(Self::PerRun),
            _ => Err(format!("Invalid result routing: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.result_timeout, Duration::from_secs(30));
        assert_eq!(policy.poll_slice, Duration::from_secs(5));
    }

    #[test]
    fn test_exhaustion_boundary() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));

        let no_retry = policy.with_max_retries(0);
        assert!(no_retry.is_exhausted(1));
        assert_eq!(no_retry.max_attempts(), 1);
    }

    #[test]
    fn test_routing_round_trips_through_str() {
        for routing in [ResultRouting::Shared, ResultRouting::PerRun] {
            assert_eq!(routing.to_string().parse::<ResultRouting>().unwrap(), routing);
        }
        assert!("broadcast".parse::<ResultRouting>().is_err());
    }
}
