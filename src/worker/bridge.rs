//! # Worker Bridge
//!
//! Remote side of the protocol. Reads one task at a time from the task
//! stream, executes it, acknowledges it and publishes the verdict.
//!
//! Processing is strictly head-of-line: the next task is not read until the
//! current one has been answered.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::constants::policy::{POLL_SLICE, TASK_READ_COUNT};
use crate::error::Result;
use crate::log_channel;
use crate::messaging::{MessageChannel, StreamEntry, StreamNames, TaskMessage};

use super::executor::SkillExecutor;

/// Consumes tasks and answers each with one result
#[derive(Debug)]
pub struct WorkerBridge<C: MessageChannel, E: SkillExecutor> {
    channel: Arc<C>,
    executor: Arc<E>,
    streams: StreamNames,
    consumer: String,
    poll_slice: Duration,
}

impl<C: MessageChannel, E: SkillExecutor> WorkerBridge<C, E> {
    pub fn new(
        channel: Arc<C>,
        executor: Arc<E>,
        streams: StreamNames,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            executor,
            streams,
            consumer: consumer.into(),
            poll_slice: POLL_SLICE,
        }
    }

    pub fn from_config(channel: Arc<C>, executor: Arc<E>, config: &RelayConfig) -> Self {
        Self::new(
            channel,
            executor,
            config.streams.stream_names(),
            config.streams.worker_consumer.clone(),
        )
        .with_poll_slice(config.worker.poll_slice())
    }

    /// Longest single blocking read; also bounds how long shutdown can take
    pub fn with_poll_slice(mut self, poll_slice: Duration) -> Self {
        self.poll_slice = poll_slice;
        self
    }

    /// Create the task consumer group
    pub async fn prepare(&self) -> Result<()> {
        self.channel
            .ensure_group(&self.streams.task_stream, &self.streams.task_group)
            .await?;
        Ok(())
    }

    /// Read and answer at most one new task
    ///
    /// Returns `false` when the slice elapsed with nothing to do.
    pub async fn process_next(&self) -> Result<bool> {
        let entries = self
            .channel
            .read_group(
                &self.streams.task_stream,
                &self.streams.task_group,
                &self.consumer,
                self.poll_slice,
                TASK_READ_COUNT,
            )
            .await?;

        let processed = !entries.is_empty();
        for entry in entries {
            self.handle_entry(entry).await?;
        }
        Ok(processed)
    }

    /// Re-run tasks this consumer claimed but never acknowledged
    ///
    /// Called at startup, after a crash between read and ack. The skill runs
    /// again, so delivery is at-least-once.
    pub async fn recover_pending(&self) -> Result<usize> {
        let mut recovered = 0;
        loop {
            let entries = self
                .channel
                .read_pending(
                    &self.streams.task_stream,
                    &self.streams.task_group,
                    &self.consumer,
                    TASK_READ_COUNT,
                )
                .await?;
            if entries.is_empty() {
                break;
            }
            for entry in entries {
                self.handle_entry(entry).await?;
                recovered += 1;
            }
        }

        if recovered > 0 {
            info!(consumer = %self.consumer, recovered, "Recovered pending tasks");
        }
        Ok(recovered)
    }

    /// Serve tasks until `shutdown` becomes `true`
    ///
    /// The flag is checked between reads, so a task already being executed
    /// is always answered. Returns the number of tasks processed.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<u64> {
        info!(
            consumer = %self.consumer,
            stream = %self.streams.task_stream,
            group = %self.streams.task_group,
            "Worker bridge started"
        );

        let mut processed = 0;
        while !*shutdown.borrow() {
            if self.process_next().await? {
                processed += 1;
            }
        }

        info!(consumer = %self.consumer, processed, "Worker bridge stopped");
        Ok(processed)
    }

    async fn handle_entry(&self, entry: StreamEntry) -> Result<()> {
        let task = match entry.decode::<TaskMessage>() {
            Ok(task) => task,
            Err(e) => {
                // No task id to answer to; drop it so it is not redelivered forever.
                warn!(
                    stream = %self.streams.task_stream,
                    record_id = %entry.record_id,
                    error = %e,
                    "Discarding undecodable task record"
                );
                self.ack(&entry).await?;
                return Ok(());
            }
        };

        if entry.is_redelivery() {
            debug!(task_id = %task.task_id, deliveries = entry.delivery_count, "Redelivered task");
        }

        let verdict = self.executor.execute(&task).await;
        self.ack(&entry).await?;

        let reply_stream = task
            .reply_to
            .as_deref()
            .unwrap_or(self.streams.result_stream.as_str());
        let success = verdict.success;
        let record_id = self
            .channel
            .publish(reply_stream, &verdict.into_result(task.task_id))
            .await?;

        log_channel!(info, "RESULT_PUBLISHED",
            stream: reply_stream,
            task_id: task.task_id,
            skill: task.skill,
            success: success,
            record_id: record_id
        );
        Ok(())
    }

    async fn ack(&self, entry: &StreamEntry) -> Result<()> {
        self.channel
            .ack(
                &self.streams.task_stream,
                &self.streams.task_group,
                &entry.record_id,
            )
            .await?;
        Ok(())
    }
}
