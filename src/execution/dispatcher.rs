//! Task dispatch: one skill call in, one task record appended.

use std::sync::Arc;

use tracing::debug;

use crate::messaging::{MessageChannel, MessagingError, TaskId, TaskMessage};
use crate::plan::SkillCall;

/// Publishes skill calls to the task stream
#[derive(Debug)]
pub struct TaskDispatcher<C: MessageChannel> {
    channel: Arc<C>,
    task_stream: String,
    reply_to: Option<String>,
}

impl<C: MessageChannel> TaskDispatcher<C> {
    pub fn new(channel: Arc<C>, task_stream: impl Into<String>) -> Self {
        Self {
            channel,
            task_stream: task_stream.into(),
            reply_to: None,
        }
    }

    /// Stamp every dispatched task with the stream results should go to
    pub fn with_reply_to(mut self, result_stream: impl Into<String>) -> Self {
        self.reply_to = Some(result_stream.into());
        self
    }

    pub fn task_stream(&self) -> &str {
        &self.task_stream
    }

    /// Publish `call` under a fresh task id and return the id
    ///
    /// Returns as soon as the record is appended; no retry on failure.
    pub async fn dispatch(&self, call: &SkillCall) -> Result<TaskId, MessagingError> {
        let task_id = TaskId::generate();
        let mut message = TaskMessage::from_call(task_id, call);
        if let Some(reply_to) = &self.reply_to {
            message = message.with_reply_to(reply_to.clone());
        }

        let record_id = self.channel.publish(&self.task_stream, &message).await?;

        debug!(
            task_id = %task_id,
            skill = %call.skill_name,
            stream = %self.task_stream,
            record_id = %record_id,
            "Task dispatched"
        );
        Ok(task_id)
    }
}
