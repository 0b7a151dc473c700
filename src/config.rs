//! # Relay Configuration
//!
//! Layered configuration built with the `config` crate:
//!
//! 1. Built-in defaults ([`RelayConfig::default`])
//! 2. Optional file (`config/skill-relay.toml` unless a path is given; any
//!    format the `config` crate understands)
//! 3. Environment variables `SKILL_RELAY_<SECTION>__<KEY>`, e.g.
//!    `SKILL_RELAY_EXECUTOR__MAX_RETRIES=3`
//!
//! The merged result is validated before it is handed out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::constants::{policy, simulation, streams};
use crate::execution::{ResultRouting, RetryPolicy};
use crate::messaging::StreamNames;

pub const DEFAULT_CONFIG_PATH: &str = "config/skill-relay.toml";
pub const ENV_PREFIX: &str = "SKILL_RELAY";
/// Between the prefix and the section name
pub const ENV_PREFIX_SEPARATOR: &str = "_";
/// Between nested keys, so single underscores stay inside key names
pub const ENV_SEPARATOR: &str = "__";

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {error}")]
    LoadError { error: String },

    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }

    pub fn missing_required_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        Self::LoadError {
            error: err.to_string(),
        }
    }
}

/// Message channel backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub backend: ChannelBackend,
    pub redis_url: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            backend: ChannelBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    pub task_stream: String,
    pub result_stream: String,
    pub task_group: String,
    pub result_group: String,
    pub client_consumer: String,
    pub worker_consumer: String,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            task_stream: streams::TASK_STREAM.to_string(),
            result_stream: streams::RESULT_STREAM.to_string(),
            task_group: streams::TASK_GROUP.to_string(),
            result_group: streams::RESULT_GROUP.to_string(),
            client_consumer: streams::CLIENT_CONSUMER.to_string(),
            worker_consumer: streams::WORKER_CONSUMER.to_string(),
        }
    }
}

impl StreamsConfig {
    pub fn stream_names(&self) -> StreamNames {
        StreamNames::new(
            self.task_stream.clone(),
            self.result_stream.clone(),
            self.task_group.clone(),
            self.result_group.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub max_retries: u32,
    pub result_timeout_ms: u64,
    pub poll_slice_ms: u64,
    pub result_routing: ResultRouting,
    /// Delete each run's result stream when it finishes (`per_run` only)
    pub cleanup_run_streams: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: policy::MAX_RETRIES,
            result_timeout_ms: policy::RESULT_TIMEOUT.as_millis() as u64,
            poll_slice_ms: policy::POLL_SLICE.as_millis() as u64,
            result_routing: ResultRouting::Shared,
            cleanup_run_streams: false,
        }
    }
}

impl ExecutorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            result_timeout: Duration::from_millis(self.result_timeout_ms),
            poll_slice: Duration::from_millis(self.poll_slice_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Simulated time spent on each skill
    pub execution_time_ms: u64,
    /// Chance that a simulated skill fails
    pub fail_probability: f64,
    pub poll_slice_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            execution_time_ms: simulation::EXECUTION_TIME.as_millis() as u64,
            fail_probability: simulation::FAIL_PROBABILITY,
            poll_slice_ms: policy::POLL_SLICE.as_millis() as u64,
        }
    }
}

impl WorkerConfig {
    pub fn execution_time(&self) -> Duration {
        Duration::from_millis(self.execution_time_ms)
    }

    pub fn poll_slice(&self) -> Duration {
        Duration::from_millis(self.poll_slice_ms)
    }
}

/// Complete relay configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub channel: ChannelConfig,
    pub streams: StreamsConfig,
    pub executor: ExecutorConfig,
    pub worker: WorkerConfig,
}

impl RelayConfig {
    /// Load defaults, then the file at `path` (or the default path if it
    /// exists), then process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading overrides from `env` instead of the
    /// process environment when given
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigurationError> {
        let (file_path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(file_path.as_path()).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_PREFIX_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let relay: RelayConfig = config.try_deserialize()?;
        relay.validate()?;

        debug!(
            file = %file_path.display(),
            backend = ?relay.channel.backend,
            task_stream = %relay.streams.task_stream,
            result_stream = %relay.streams.result_stream,
            max_retries = relay.executor.max_retries,
            "Configuration loaded"
        );
        Ok(relay)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let names = [
            ("streams.task_stream", &self.streams.task_stream),
            ("streams.result_stream", &self.streams.result_stream),
            ("streams.task_group", &self.streams.task_group),
            ("streams.result_group", &self.streams.result_group),
            ("streams.client_consumer", &self.streams.client_consumer),
            ("streams.worker_consumer", &self.streams.worker_consumer),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(field, "streams"));
            }
        }

        if self.streams.task_stream == self.streams.result_stream {
            return Err(ConfigurationError::invalid_value(
                "streams.result_stream",
                &self.streams.result_stream,
                "task and result streams must differ",
            ));
        }

        if self.channel.backend == ChannelBackend::Redis && self.channel.redis_url.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "channel.redis_url",
                "redis backend",
            ));
        }

        if self.executor.result_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.result_timeout_ms",
                0,
                "must be greater than 0",
            ));
        }
        if self.executor.poll_slice_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "executor.poll_slice_ms",
                0,
                "must be greater than 0",
            ));
        }
        if self.executor.poll_slice_ms > self.executor.result_timeout_ms {
            return Err(ConfigurationError::invalid_value(
                "executor.poll_slice_ms",
                self.executor.poll_slice_ms,
                "must not exceed executor.result_timeout_ms",
            ));
        }

        if self.worker.poll_slice_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.poll_slice_ms",
                0,
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.worker.fail_probability) {
            return Err(ConfigurationError::invalid_value(
                "worker.fail_probability",
                self.worker.fail_probability,
                "must be within [0, 1]",
            ));
        }

        Ok(())
    }
}
