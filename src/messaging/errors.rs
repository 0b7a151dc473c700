//! # Messaging Error Types
//!
//! Structured errors for stream operations, shared by every channel provider.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Stream operation failed: {stream}: {operation}: {message}")]
    StreamOperation {
        stream: String,
        operation: String,
        message: String,
    },

    #[error("Consumer group not found: {stream}/{group}")]
    GroupNotFound { stream: String, group: String },

    #[error("Invalid record id: {record_id}")]
    InvalidRecordId { record_id: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

impl MessagingError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn stream_operation(
        stream: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::StreamOperation {
            stream: stream.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn group_not_found(stream: impl Into<String>, group: impl Into<String>) -> Self {
        Self::GroupNotFound {
            stream: stream.into(),
            group: group.into(),
        }
    }

    pub fn invalid_record_id(record_id: impl Into<String>) -> Self {
        Self::InvalidRecordId {
            record_id: record_id.into(),
        }
    }

    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Errors raised by the backend itself, as opposed to bad payloads.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::StreamOperation { .. }
                | Self::GroupNotFound { .. }
                | Self::Protocol { .. }
        )
    }
}

impl From<redis::RedisError> for MessagingError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            Self::connection(err.to_string())
        } else {
            Self::protocol(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        Self::message_serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MessagingError::stream_operation("robot.tasks", "xadd", "broken pipe");
        assert_eq!(
            err.to_string(),
            "Stream operation failed: robot.tasks: xadd: broken pipe"
        );

        let err = MessagingError::group_not_found("robot.events", "langgraph");
        assert_eq!(
            err.to_string(),
            "Consumer group not found: robot.events/langgraph"
        );
    }

    #[test]
    fn test_transport_classification() {
        assert!(MessagingError::connection("refused").is_transport());
        assert!(MessagingError::protocol("WRONGTYPE").is_transport());
        assert!(!MessagingError::message_deserialization("missing task_id").is_transport());
        assert!(!MessagingError::invalid_record_id("abc").is_transport());
    }
}
