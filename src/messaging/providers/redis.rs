//! # Redis Streams Message Channel
//!
//! `MessageChannel` over Redis streams using the `redis` crate.
//!
//! | Operation | Redis command |
//! |-----------|---------------|
//! | `ensure_group` | `XGROUP CREATE <stream> <group> 0 MKSTREAM` (`BUSYGROUP` ignored) |
//! | `publish` | `XADD <stream> * field value ...` |
//! | `read_group` | `XREADGROUP GROUP <group> <consumer> COUNT n BLOCK ms STREAMS <stream> >` |
//! | `read_pending` | `XREADGROUP ... STREAMS <stream> 0` |
//! | `ack` | `XACK <stream> <group> <id>` |
//! | `pending_count` | `XPENDING <stream> <group>` |
//! | `stream_len` | `XLEN <stream>` |
//! | `delete_stream` | `DEL <stream>` (drops its groups too) |
//!
//! Blocking reads hold their connection for the whole block window, so each
//! blocking read opens its own connection instead of stalling the shared
//! command connection used for publishes and acks.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamPendingReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use crate::constants::streams::GROUP_ORIGIN_ID;
use crate::messaging::traits::{MessageChannel, StreamMessage};
use crate::messaging::types::{RecordId, StreamEntry, StreamFields};
use crate::messaging::MessagingError;

/// Redis-backed message channel
#[derive(Clone)]
pub struct RedisChannel {
    client: Client,
    /// Shared connection for non-blocking commands
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisChannel")
            .field("connection_info", &self.client.get_connection_info().addr)
            .finish()
    }
}

impl RedisChannel {
    /// Connect to `redis_url` (e.g. `redis://127.0.0.1:6379`)
    pub async fn connect(redis_url: &str) -> Result<Self, MessagingError> {
        let client = Client::open(redis_url).map_err(|e| {
            MessagingError::configuration("redis", format!("invalid redis url: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| MessagingError::connection(format!("redis connection failed: {e}")))?;

        info!(addr = ?client.get_connection_info().addr, "Connected to redis streams");
        Ok(Self { client, connection })
    }

    async fn blocking_connection(&self) -> Result<MultiplexedConnection, MessagingError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| MessagingError::connection(format!("redis connection failed: {e}")))
    }

    fn entries_from_reply(
        reply: Option<StreamReadReply>,
        delivery_count: u32,
    ) -> Result<Vec<StreamEntry>, MessagingError> {
        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                // Pending entries whose record was trimmed come back with no fields.
                if id.map.is_empty() {
                    continue;
                }
                let mut fields = StreamFields::new();
                for (name, value) in &id.map {
                    let text: String = redis::from_redis_value(value).map_err(|e| {
                        MessagingError::message_deserialization(format!(
                            "field '{name}' of record {}: {e}",
                            id.id
                        ))
                    })?;
                    fields.insert(name.clone(), text);
                }
                entries.push(
                    StreamEntry::new(RecordId::new(id.id.clone()), fields)
                        .with_delivery_count(delivery_count),
                );
            }
        }
        Ok(entries)
    }
}

fn block_millis(block_timeout: Duration) -> usize {
    // BLOCK 0 means "forever", so never round a positive timeout down to it
    (block_timeout.as_millis() as usize).max(1)
}

#[async_trait]
impl MessageChannel for RedisChannel {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), MessagingError> {
        let mut conn = self.connection.clone();
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(stream, group, GROUP_ORIGIN_ID)
            .await;

        match created {
            Ok(()) => {
                info!(stream = %stream, group = %group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream = %stream, group = %group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(MessagingError::stream_operation(
                stream,
                "xgroup_create",
                e.to_string(),
            )),
        }
    }

    async fn publish<T: StreamMessage>(
        &self,
        stream: &str,
        message: &T,
    ) -> Result<RecordId, MessagingError> {
        let fields: Vec<(String, String)> = message.to_fields()?.into_iter().collect();

        let mut conn = self.connection.clone();
        let id: String = conn
            .xadd(stream, "*", fields.as_slice())
            .await
            .map_err(|e| MessagingError::stream_operation(stream, "xadd", e.to_string()))?;

        debug!(stream = %stream, record_id = %id, "Record appended");
        Ok(RecordId::new(id))
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block_timeout: Duration,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, MessagingError> {
        let mut options = StreamReadOptions::default()
            .group(group, consumer)
            .count(max_count);

        let result: redis::RedisResult<Option<StreamReadReply>> = if block_timeout.is_zero() {
            let mut conn = self.connection.clone();
            conn.xread_options(&[stream], &[">"], &options).await
        } else {
            options = options.block(block_millis(block_timeout));
            let mut conn = self.blocking_connection().await?;
            conn.xread_options(&[stream], &[">"], &options).await
        };
        let reply = result
            .map_err(|e| MessagingError::stream_operation(stream, "xreadgroup", e.to_string()))?;

        Self::entries_from_reply(reply, 1)
    }

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, MessagingError> {
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(max_count);

        let mut conn = self.connection.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[stream], &[GROUP_ORIGIN_ID], &options)
            .await
            .map_err(|e| MessagingError::stream_operation(stream, "xreadgroup", e.to_string()))?;

        Self::entries_from_reply(reply, 2)
    }

    async fn ack(
        &self,
        stream: &str,
        group: &str,
        record_id: &RecordId,
    ) -> Result<bool, MessagingError> {
        let mut conn = self.connection.clone();
        let acked: u64 = conn
            .xack(stream, group, &[record_id.as_str()])
            .await
            .map_err(|e| MessagingError::stream_operation(stream, "xack", e.to_string()))?;
        Ok(acked > 0)
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64, MessagingError> {
        let mut conn = self.connection.clone();
        let reply: StreamPendingReply = conn
            .xpending(stream, group)
            .await
            .map_err(|e| MessagingError::stream_operation(stream, "xpending", e.to_string()))?;
        Ok(reply.count() as u64)
    }

    async fn stream_len(&self, stream: &str) -> Result<u64, MessagingError> {
        let mut conn = self.connection.clone();
        let len: u64 = conn
            .xlen(stream)
            .await
            .map_err(|e| MessagingError::stream_operation(stream, "xlen", e.to_string()))?;
        Ok(len)
    }

    async fn delete_stream(&self, stream: &str) -> Result<bool, MessagingError> {
        let mut conn = self.connection.clone();
        let removed: u64 = conn
            .del(stream)
            .await
            .map_err(|e| MessagingError::stream_operation(stream, "del", e.to_string()))?;
        Ok(removed > 0)
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}
