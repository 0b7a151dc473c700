//! # Result Watcher
//!
//! Bounded wait for the result of one task. The result stream is read in
//! slices of at most `poll_slice`, one record at a time. Every record is
//! acknowledged before it is looked at, so records for other tasks are
//! consumed and dropped rather than left in the backlog.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::constants::fields;
use crate::constants::policy::RESULT_READ_COUNT;
use crate::messaging::{
    MessageChannel, MessagingError, ResultMessage, StreamEntry, TaskId, TaskStatus,
};

/// What the watcher learned about a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultVerdict {
    Succeeded,
    Failed { reason: Option<String> },
    /// No matching result before the deadline
    TimedOut,
}

impl ResultVerdict {
    /// Timeouts count as failures
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl From<ResultMessage> for ResultVerdict {
    fn from(result: ResultMessage) -> Self {
        match result.status {
            TaskStatus::Success => Self::Succeeded,
            TaskStatus::Failed => Self::Failed {
                reason: result.reason,
            },
        }
    }
}

/// Reads one result stream through one consumer
#[derive(Debug)]
pub struct ResultWatcher<C: MessageChannel> {
    channel: Arc<C>,
    result_stream: String,
    result_group: String,
    consumer: String,
    poll_slice: Duration,
}

impl<C: MessageChannel> ResultWatcher<C> {
    pub fn new(
        channel: Arc<C>,
        result_stream: impl Into<String>,
        result_group: impl Into<String>,
        consumer: impl Into<String>,
        poll_slice: Duration,
    ) -> Self {
        Self {
            channel,
            result_stream: result_stream.into(),
            result_group: result_group.into(),
            consumer: consumer.into(),
            poll_slice,
        }
    }

    pub fn result_stream(&self) -> &str {
        &self.result_stream
    }

    /// Wait up to `timeout` for the result of `task_id`; `true` only on `SUCCESS`
    pub async fn await_result(
        &self,
        task_id: TaskId,
        timeout: Duration,
    ) -> Result<bool, MessagingError> {
        Ok(self.await_verdict(task_id, timeout).await?.is_success())
    }

    /// Wait up to `timeout` for the result of `task_id`
    ///
    /// Returns on the first matching record. Never blocks past the deadline:
    /// each slice is clamped to the time remaining.
    pub async fn await_verdict(
        &self,
        task_id: TaskId,
        timeout: Duration,
    ) -> Result<ResultVerdict, MessagingError> {
        let deadline = Instant::now() + timeout;

        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!(
                    task_id = %task_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "No result before deadline"
                );
                return Ok(ResultVerdict::TimedOut);
            }
            let slice = self.poll_slice.min(deadline - now);

            let entries = self
                .channel
                .read_group(
                    &self.result_stream,
                    &self.result_group,
                    &self.consumer,
                    slice,
                    RESULT_READ_COUNT,
                )
                .await?;

            for entry in entries {
                self.channel
                    .ack(&self.result_stream, &self.result_group, &entry.record_id)
                    .await?;

                if let Some(verdict) = self.inspect(&entry, task_id) {
                    return Ok(verdict);
                }
            }
        }
    }

    /// Verdict carried by `entry` if it answers `task_id`
    ///
    /// The task id is checked before the rest of the record, so a matching
    /// result with an unrecognized or missing status still ends the wait, as
    /// a failure.
    fn inspect(&self, entry: &StreamEntry, task_id: TaskId) -> Option<ResultVerdict> {
        let parsed = entry
            .fields
            .get(fields::TASK_ID)
            .map(|raw| raw.parse::<TaskId>());
        let received = match parsed {
            Some(Ok(received)) => received,
            Some(Err(e)) => {
                warn!(
                    stream = %self.result_stream,
                    record_id = %entry.record_id,
                    error = %e,
                    "Discarding result record with malformed task_id"
                );
                return None;
            }
            None => {
                warn!(
                    stream = %self.result_stream,
                    record_id = %entry.record_id,
                    "Discarding result record without task_id"
                );
                return None;
            }
        };

        if received != task_id {
            debug!(
                expected = %task_id,
                received = %received,
                record_id = %entry.record_id,
                "Discarding result for another task"
            );
            return None;
        }

        let verdict = match entry.decode::<ResultMessage>() {
            Ok(result) => ResultVerdict::from(result),
            Err(e) => {
                let status = entry.fields.get(fields::STATUS).map(String::as_str);
                warn!(
                    task_id = %task_id,
                    record_id = %entry.record_id,
                    status = ?status,
                    error = %e,
                    "Matching result has no recognized status; treating it as failed"
                );
                ResultVerdict::Failed {
                    reason: Some(format!("unrecognized status: {}", status.unwrap_or(""))),
                }
            }
        };

        debug!(
            task_id = %task_id,
            verdict = ?verdict,
            record_id = %entry.record_id,
            "Matching result received"
        );
        Some(verdict)
    }
}
