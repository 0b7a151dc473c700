//! # Stream Records
//!
//! Task and result records exchanged between the plan executor and the
//! worker bridge.
//!
//! Task stream: `{task_id, skill, params, [reply_to]}` where `params` is the
//! JSON-serialized argument map. Result stream: `{task_id, status, reason}`
//! where `status` is `SUCCESS` or `FAILED` and `reason` is empty when absent.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::traits::{required_field, StreamMessage};
use super::types::StreamFields;
use super::MessagingError;
use crate::constants::fields;
use crate::plan::SkillCall;

/// Correlation id carried by one dispatched task and its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Fresh globally-unique id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TaskId {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|e| {
            MessagingError::message_deserialization(format!("invalid task_id '{s}': {e}"))
        })
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Worker verdict for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            _ => Err(MessagingError::message_deserialization(format!(
                "invalid task status: {s}"
            ))),
        }
    }
}

/// One dispatched skill invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMessage {
    pub task_id: TaskId,
    pub skill: String,
    pub params: BTreeMap<String, String>,
    /// Result stream the worker should answer on; `None` means the shared one
    pub reply_to: Option<String>,
}

impl TaskMessage {
    pub fn new(
        task_id: TaskId,
        skill: impl Into<String>,
        params: BTreeMap<String, String>,
    ) -> Self {
        Self {
            task_id,
            skill: skill.into(),
            params,
            reply_to: None,
        }
    }

    pub fn from_call(task_id: TaskId, call: &SkillCall) -> Self {
        Self::new(task_id, call.skill_name.clone(), call.arguments.clone())
    }

    pub fn with_reply_to(mut self, stream: impl Into<String>) -> Self {
        self.reply_to = Some(stream.into());
        self
    }
}

impl StreamMessage for TaskMessage {
    fn to_fields(&self) -> Result<StreamFields, MessagingError> {
        let mut out = StreamFields::new();
        out.insert(fields::TASK_ID.to_string(), self.task_id.to_string());
        out.insert(fields::SKILL.to_string(), self.skill.clone());
        out.insert(fields::PARAMS.to_string(), serde_json::to_string(&self.params)?);
        if let Some(reply_to) = &self.reply_to {
            out.insert(fields::REPLY_TO.to_string(), reply_to.clone());
        }
        Ok(out)
    }

    fn from_fields(record: &StreamFields) -> Result<Self, MessagingError> {
        let task_id = required_field(record, fields::TASK_ID)?.parse()?;
        let skill = required_field(record, fields::SKILL)?.to_string();
        let params = match record.get(fields::PARAMS) {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw).map_err(|e| {
                MessagingError::message_deserialization(format!("invalid params: {e}"))
            })?,
            _ => BTreeMap::new(),
        };
        let reply_to = record
            .get(fields::REPLY_TO)
            .filter(|stream| !stream.is_empty())
            .cloned();

        Ok(Self {
            task_id,
            skill,
            params,
            reply_to,
        })
    }
}

/// Worker verdict record for one task
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMessage {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Free-form detail; never interpreted by the client
    pub reason: Option<String>,
}

impl ResultMessage {
    pub fn success(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Success,
            reason: None,
        }
    }

    pub fn failed(task_id: TaskId, reason: Option<String>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            reason,
        }
    }
}

impl StreamMessage for ResultMessage {
    fn to_fields(&self) -> Result<StreamFields, MessagingError> {
        let mut out = StreamFields::new();
        out.insert(fields::TASK_ID.to_string(), self.task_id.to_string());
        out.insert(fields::STATUS.to_string(), self.status.to_string());
        out.insert(
            fields::REASON.to_string(),
            self.reason.clone().unwrap_or_default(),
        );
        Ok(out)
    }

    fn from_fields(record: &StreamFields) -> Result<Self, MessagingError> {
        let task_id = required_field(record, fields::TASK_ID)?.parse()?;
        let status = required_field(record, fields::STATUS)?.parse()?;
        let reason = record
            .get(fields::REASON)
            .filter(|reason| !reason.is_empty())
            .cloned();

        Ok(Self {
            task_id,
            status,
            reason,
        })
    }
}
