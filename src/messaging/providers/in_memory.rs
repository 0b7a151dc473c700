//! # In-Memory Message Channel
//!
//! Thread-safe in-memory streams with consumer-group semantics, for tests and
//! single-process demos.
//!
//! ## Features
//!
//! - **Consumer Groups**: Per-group delivery cursor, per-consumer pending lists
//! - **Blocking Reads**: Readers park on a `tokio::sync::Notify` woken by publishes
//! - **Full MessageChannel Implementation**: Same observable semantics as Redis streams

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;

use crate::messaging::traits::{MessageChannel, StreamMessage};
use crate::messaging::types::{RecordId, StreamEntry, StreamFields};
use crate::messaging::MessagingError;

#[derive(Debug, Clone)]
struct StoredRecord {
    seq: u64,
    fields: StreamFields,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    consumer: String,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct ConsumerGroup {
    /// Highest sequence handed out to any consumer of this group
    last_delivered: u64,
    /// Delivered but unacknowledged records, keyed by sequence
    pending: BTreeMap<u64, PendingEntry>,
}

#[derive(Debug)]
struct InMemoryStream {
    records: Vec<StoredRecord>,
    groups: HashMap<String, ConsumerGroup>,
    next_seq: u64,
}

impl InMemoryStream {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            groups: HashMap::new(),
            next_seq: 1,
        }
    }

    fn record(&self, seq: u64) -> Option<&StoredRecord> {
        // records are appended with strictly increasing sequences
        self.records
            .binary_search_by_key(&seq, |record| record.seq)
            .ok()
            .map(|idx| &self.records[idx])
    }
}

fn record_id_for(seq: u64) -> RecordId {
    RecordId::new(format!("{seq}-0"))
}

fn seq_of(record_id: &RecordId) -> Result<u64, MessagingError> {
    record_id
        .as_str()
        .split_once('-')
        .and_then(|(seq, _)| seq.parse().ok())
        .ok_or_else(|| MessagingError::invalid_record_id(record_id.as_str()))
}

/// In-memory message channel
///
/// Provides a complete `MessageChannel` implementation. Every handle is
/// independent; share one via `Arc` between the executor and the worker bridge.
///
/// # Example
///
/// ```rust
/// use skill_relay::messaging::{InMemoryChannel, MessageChannel, ResultMessage, TaskId};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let channel = InMemoryChannel::new();
/// channel.ensure_group("robot.events", "langgraph").await?;
///
/// channel.publish("robot.events", &ResultMessage::success(TaskId::generate())).await?;
///
/// let entries = channel
///     .read_group("robot.events", "langgraph", "lg_1", Duration::from_secs(5), 1)
///     .await?;
/// channel.ack("robot.events", "langgraph", &entries[0].record_id).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InMemoryChannel {
    streams: RwLock<HashMap<String, InMemoryStream>>,
    published: Notify,
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            published: Notify::new(),
        }
    }

    /// Decoded snapshot of every record in `stream`, in append order (for testing)
    pub async fn records<T: StreamMessage>(&self, stream: &str) -> Result<Vec<T>, MessagingError> {
        let streams = self.streams.read().await;
        match streams.get(stream) {
            Some(s) => s.records.iter().map(|r| T::from_fields(&r.fields)).collect(),
            None => Ok(Vec::new()),
        }
    }

    /// Append a raw field map, bypassing message encoding (for testing malformed records)
    pub async fn publish_raw(
        &self,
        stream: &str,
        fields: StreamFields,
    ) -> Result<RecordId, MessagingError> {
        let id = {
            let mut streams = self.streams.write().await;
            let s = streams
                .entry(stream.to_string())
                .or_insert_with(InMemoryStream::new);
            let seq = s.next_seq;
            s.next_seq += 1;
            s.records.push(StoredRecord { seq, fields });
            record_id_for(seq)
        };
        self.published.notify_waiters();
        Ok(id)
    }

    /// Hand out new records to `consumer` without blocking
    async fn take_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, MessagingError> {
        let mut streams = self.streams.write().await;
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| MessagingError::group_not_found(stream, group))?;

        let cursor = s
            .groups
            .get(group)
            .ok_or_else(|| MessagingError::group_not_found(stream, group))?
            .last_delivered;

        let fresh: Vec<StoredRecord> = s
            .records
            .iter()
            .filter(|record| record.seq > cursor)
            .take(max_count)
            .cloned()
            .collect();

        let Some(cg) = s.groups.get_mut(group) else {
            return Err(MessagingError::group_not_found(stream, group));
        };

        let mut delivered = Vec::with_capacity(fresh.len());
        for record in fresh {
            cg.last_delivered = record.seq;
            cg.pending.insert(
                record.seq,
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivery_count: 1,
                },
            );
            delivered.push(StreamEntry::new(record_id_for(record.seq), record.fields));
        }

        Ok(delivered)
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), MessagingError> {
        let mut streams = self.streams.write().await;
        streams
            .entry(stream.to_string())
            .or_insert_with(InMemoryStream::new)
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn publish<T: StreamMessage>(
        &self,
        stream: &str,
        message: &T,
    ) -> Result<RecordId, MessagingError> {
        let fields = message.to_fields()?;
        self.publish_raw(stream, fields).await
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block_timeout: Duration,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, MessagingError> {
        let deadline = Instant::now() + block_timeout;

        loop {
            // Registered before the check so a publish in between is not missed.
            let published = self.published.notified();

            let entries = self.take_new(stream, group, consumer, max_count).await?;
            if !entries.is_empty() {
                return Ok(entries);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            if tokio::time::timeout(deadline - now, published).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, MessagingError> {
        let mut streams = self.streams.write().await;
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| MessagingError::group_not_found(stream, group))?;

        let owned: Vec<u64> = s
            .groups
            .get(group)
            .ok_or_else(|| MessagingError::group_not_found(stream, group))?
            .pending
            .iter()
            .filter(|(_, entry)| entry.consumer == consumer)
            .map(|(seq, _)| *seq)
            .take(max_count)
            .collect();

        let mut redelivered = Vec::with_capacity(owned.len());
        for seq in owned {
            let Some(fields) = s.record(seq).map(|record| record.fields.clone()) else {
                continue;
            };
            if let Some(entry) = s
                .groups
                .get_mut(group)
                .and_then(|cg| cg.pending.get_mut(&seq))
            {
                entry.delivery_count += 1;
                redelivered.push(
                    StreamEntry::new(record_id_for(seq), fields)
                        .with_delivery_count(entry.delivery_count),
                );
            }
        }

        Ok(redelivered)
    }

    async fn ack(
        &self,
        stream: &str,
        group: &str,
        record_id: &RecordId,
    ) -> Result<bool, MessagingError> {
        let seq = seq_of(record_id)?;

        let mut streams = self.streams.write().await;
        let acked = streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .map(|cg| cg.pending.remove(&seq).is_some())
            .unwrap_or(false);

        Ok(acked)
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64, MessagingError> {
        let streams = self.streams.read().await;
        streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|cg| cg.pending.len() as u64)
            .ok_or_else(|| MessagingError::group_not_found(stream, group))
    }

    async fn stream_len(&self, stream: &str) -> Result<u64, MessagingError> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream)
            .map(|s| s.records.len() as u64)
            .unwrap_or(0))
    }

    async fn delete_stream(&self, stream: &str) -> Result<bool, MessagingError> {
        Ok(self.streams.write().await.remove(stream).is_some())
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
