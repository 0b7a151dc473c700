//! # Message Channel Traits
//!
//! Core trait definitions for append-only streams with consumer groups.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{RecordId, StreamEntry, StreamFields};
use super::MessagingError;

/// Append-only streams read through durable consumer groups
///
/// Implementations provide:
///
/// - Idempotent consumer-group creation positioned at the stream origin
/// - Appends where, within one stream, append order equals read order
/// - Blocking group reads that leave records pending until acknowledged
/// - Idempotent acknowledgment
///
/// Delivery is at-least-once per group: a record that is never acknowledged
/// stays pending for its consumer and can be re-read with [`read_pending`].
///
/// [`read_pending`]: MessageChannel::read_pending
#[async_trait]
pub trait MessageChannel: Send + Sync + 'static {
    /// Create `group` on `stream` if it doesn't exist
    ///
    /// Creates the stream when missing. The group starts at id `0` so records
    /// appended before the group existed are still delivered. Calling this
    /// against an existing group succeeds silently.
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), MessagingError>;

    /// Bulk group creation, called at process start
    async fn ensure_groups(&self, bindings: &[(String, String)]) -> Result<(), MessagingError> {
        for (stream, group) in bindings {
            self.ensure_group(stream, group).await?;
        }
        Ok(())
    }

    /// Append a record to `stream`, returning once it is stored
    async fn publish<T: StreamMessage>(
        &self,
        stream: &str,
        message: &T,
    ) -> Result<RecordId, MessagingError>;

    /// Read up to `max_count` records never delivered to any consumer of `group`
    ///
    /// Blocks up to `block_timeout` when nothing is available; a zero timeout
    /// returns immediately. Returned records stay pending for `consumer` until
    /// acknowledged.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block_timeout: Duration,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, MessagingError>;

    /// Re-read records delivered to `consumer` but never acknowledged
    ///
    /// Used after a crash to resume work the consumer had already claimed.
    /// Never blocks.
    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, MessagingError>;

    /// Mark a record as processed for `group`
    ///
    /// Returns whether a pending entry was cleared. Acknowledging an already
    /// acknowledged or unknown record returns `Ok(false)`.
    async fn ack(
        &self,
        stream: &str,
        group: &str,
        record_id: &RecordId,
    ) -> Result<bool, MessagingError>;

    /// Number of delivered-but-unacknowledged records in `group`
    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64, MessagingError>;

    /// Number of records stored in `stream` (acknowledged or not)
    async fn stream_len(&self, stream: &str) -> Result<u64, MessagingError>;

    /// Remove `stream` with all its records and groups
    ///
    /// Returns whether the stream existed.
    async fn delete_stream(&self, stream: &str) -> Result<bool, MessagingError>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> Result<bool, MessagingError>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

/// Flat field-map encoding for stream records
///
/// Stream records are string maps, not documents. Structured values (such as
/// skill arguments) are serialized into a single field by the implementor.
pub trait StreamMessage: Send + Sync + Clone + 'static {
    fn to_fields(&self) -> Result<StreamFields, MessagingError>;

    fn from_fields(fields: &StreamFields) -> Result<Self, MessagingError>
    where
        Self: Sized;
}

/// Read a required field, failing with a deserialization error when absent
pub(crate) fn required_field<'a>(
    fields: &'a StreamFields,
    name: &str,
) -> Result<&'a str, MessagingError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| MessagingError::message_deserialization(format!("missing field '{name}'")))
}
