//! # Messaging Types
//!
//! Provider-agnostic record identifiers, raw stream entries and stream naming.

use std::collections::BTreeMap;

use super::traits::StreamMessage;
use super::MessagingError;

/// Identifier assigned to a record when it is appended to a stream
///
/// The format is provider-specific:
/// - Redis: `<millis>-<seq>` as returned by `XADD`
/// - InMemory: `<seq>-0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Flat field map carried by one stream record
pub type StreamFields = BTreeMap<String, String>;

/// A record delivered to a consumer, not yet decoded
///
/// Decoding is left to the caller so that a record with a malformed payload
/// can still be acknowledged by id.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    /// Id used to acknowledge this record
    pub record_id: RecordId,

    /// Raw field map as stored in the stream
    pub fields: StreamFields,

    /// Number of times the record has been handed to a consumer
    ///
    /// Always 1 for first deliveries. Providers that cannot report the real
    /// count for redeliveries (Redis without `XPENDING` lookups) report 2.
    pub delivery_count: u32,
}

impl StreamEntry {
    pub fn new(record_id: RecordId, fields: StreamFields) -> Self {
        Self {
            record_id,
            fields,
            delivery_count: 1,
        }
    }

    pub fn with_delivery_count(mut self, count: u32) -> Self {
        self.delivery_count = count;
        self
    }

    /// Decode the field map into a typed message
    pub fn decode<T: StreamMessage>(&self) -> Result<T, MessagingError> {
        T::from_fields(&self.fields)
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Names of the two streams and their consumer groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamNames {
    /// Client to worker
    pub task_stream: String,
    /// Worker to client
    pub result_stream: String,
    /// Group the worker bridge reads tasks through
    pub task_group: String,
    /// Group the result watcher reads results through
    pub result_group: String,
}

impl StreamNames {
    pub fn new(
        task_stream: impl Into<String>,
        result_stream: impl Into<String>,
        task_group: impl Into<String>,
        result_group: impl Into<String>,
    ) -> Self {
        Self {
            task_stream: task_stream.into(),
            result_stream: result_stream.into(),
            task_group: task_group.into(),
            result_group: result_group.into(),
        }
    }

    /// Stream/group pairs that must exist before the first read
    pub fn group_bindings(&self) -> Vec<(String, String)> {
        vec![
            (self.task_stream.clone(), self.task_group.clone()),
            (self.result_stream.clone(), self.result_group.clone()),
        ]
    }

    /// Result stream scoped to one execution run
    pub fn run_result_stream(&self, run_id: &uuid::Uuid) -> String {
        format!("{}.{}", self.result_stream, run_id)
    }
}

impl Default for StreamNames {
    fn default() -> Self {
        use crate::constants::streams;
        Self::new(
            streams::TASK_STREAM,
            streams::RESULT_STREAM,
            streams::TASK_GROUP,
            streams::RESULT_GROUP,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_conversions() {
        let id = RecordId::from("1700000000000-0");
        assert_eq!(id.as_str(), "1700000000000-0");
        assert_eq!(id.to_string(), "1700000000000-0");
    }

    #[test]
    fn test_stream_entry_redelivery() {
        let entry = StreamEntry::new(RecordId::from("1-0"), StreamFields::new());
        assert!(!entry.is_redelivery());
        assert!(entry.with_delivery_count(3).is_redelivery());
    }

    #[test]
    fn test_default_stream_names() {
        let names = StreamNames::default();
        assert_eq!(names.task_stream, "robot.tasks");
        assert_eq!(names.result_stream, "robot.events");
        assert_eq!(
            names.group_bindings(),
            vec![
                ("robot.tasks".to_string(), "ros_bridge".to_string()),
                ("robot.events".to_string(), "langgraph".to_string()),
            ]
        );
    }

    #[test]
    fn test_run_result_stream_is_scoped() {
        let names = StreamNames::default();
        let run_id = uuid::Uuid::new_v4();
        let scoped = names.run_result_stream(&run_id);
        assert!(scoped.starts_with("robot.events."));
        assert!(scoped.ends_with(&run_id.to_string()));
    }
}
