//! # Channel Provider Enum
//!
//! Enum dispatch over the channel providers, avoiding trait objects.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::providers::{InMemoryChannel, RedisChannel};
use super::traits::{MessageChannel, StreamMessage};
use super::types::{RecordId, StreamEntry};
use super::MessagingError;
use crate::config::{ChannelBackend, ChannelConfig};

/// Provider enum for static dispatch
///
/// `MessageChannel` has generic methods, so it cannot be used as
/// `dyn MessageChannel`. The enum lets the binary pick a backend from
/// configuration while the executor and worker stay generic over one type.
///
/// # Example
///
/// ```ignore
/// let provider = ChannelProvider::from_config(&config.channel).await?;
/// let record_id = provider.publish("robot.tasks", &task).await?;
/// ```
#[derive(Debug)]
pub enum ChannelProvider {
    /// Redis streams
    Redis(RedisChannel),

    /// In-memory streams for tests and single-process demos
    InMemory(InMemoryChannel),
}

impl ChannelProvider {
    /// Build the provider named by `config.backend`
    pub async fn from_config(config: &ChannelConfig) -> Result<Self, MessagingError> {
        let provider = match config.backend {
            ChannelBackend::Redis => Self::Redis(RedisChannel::connect(&config.redis_url).await?),
            ChannelBackend::Memory => Self::InMemory(InMemoryChannel::new()),
        };
        info!(provider = provider.provider_name(), "Message channel ready");
        Ok(provider)
    }
}

#[async_trait]
impl MessageChannel for ChannelProvider {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), MessagingError> {
        match self {
            Self::Redis(c) => c.ensure_group(stream, group).await,
            Self::InMemory(c) => c.ensure_group(stream, group).await,
        }
    }

    async fn publish<T: StreamMessage>(
        &self,
        stream: &str,
        message: &T,
    ) -> Result<RecordId, MessagingError> {
        match self {
            Self::Redis(c) => c.publish(stream, message).await,
            Self::InMemory(c) => c.publish(stream, message).await,
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block_timeout: Duration,
        max_count: usize,
    ) -> Result<Vec<StreamEntry>, MessagingError> {
        match self {
            Self::Redis(c) => {
                c.read_group(stream, group, consumer, block_timeout, max_count)
                    .await
            }
            Self::InMemory(c) => {
                c.read_group(stream, group, consumer, block_timeout, max_count)
                    .await
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
        match self {
            Self::Redis(c) => c.read_pending(stream, group, consumer, max_count).await,
            Self::InMemory(c) => c.read_pending(stream, group, consumer, max_count).await,
        }
    }

    async fn ack(
        &self,
        stream: &str,
        group: &str,
        record_id: &RecordId,
    ) -> Result<bool, MessagingError> {
        match self {
            Self::Redis(c) => c.ack(stream, group, record_id).await,
            Self::InMemory(c) => c.ack(stream, group, record_id).await,
        }
    }

    async fn pending_count(&self, stream: &str, group: &str) -> Result<u64, MessagingError> {
        match self {
            Self::Redis(c) => c.pending_count(stream, group).await,
            Self::InMemory(c) => c.pending_count(stream, group).await,
        }
    }

    async fn stream_len(&self, stream: &str) -> Result<u64, MessagingError> {
        match self {
            Self::Redis(c) => c.stream_len(stream).await,
            Self::InMemory(c) => c.stream_len(stream).await,
        }
    }

    async fn delete_stream(&self, stream: &str) -> Result<bool, MessagingError> {
        match self {
            Self::Redis(c) => c.delete_stream(stream).await,
            Self::InMemory(c) => c.delete_stream(stream).await,
        }
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        match self {
            Self::Redis(c) => c.health_check().await,
            Self::InMemory(c) => c.health_check().await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::InMemory(_) => "in_memory",
        }
    }
}
