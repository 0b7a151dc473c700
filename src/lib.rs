#![allow(clippy::doc_markdown)] // Allow technical terms like XREADGROUP, BUSYGROUP in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Skill Relay
//!
//! Dispatches plans of symbolic skill calls to a remote robot (or a simulator
//! of one) over durable message streams, and drives each plan to `SUCCESS`
//! or `FAILED` with bounded per-step retries.
//!
//! ## Architecture
//!
//! ```text
//! PlanExecutor ──> TaskDispatcher ──> robot.tasks ──> WorkerBridge
//!      ^                                                   │
//!      └────── ResultWatcher <──── robot.events <──────────┘
//! ```
//!
//! The executor and the worker share nothing but the two streams. Both are
//! generic over [`MessageChannel`](messaging::MessageChannel), so tests run
//! them against [`InMemoryChannel`](messaging::InMemoryChannel) and
//! deployments against [`RedisChannel`](messaging::RedisChannel).
//!
//! ## Module Organization
//!
//! - [`messaging`] - Stream channel trait, providers and wire records
//! - [`execution`] - Dispatcher, result watcher and the execution state machine
//! - [`worker`] - Worker bridge and skill executors
//! - [`plan`] - Skill calls, plans and catalog validation
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skill_relay::config::RelayConfig;
//! use skill_relay::execution::PlanExecutor;
//! use skill_relay::messaging::ChannelProvider;
//! use skill_relay::plan::{Plan, SkillCall};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::load(None)?;
//! let channel = Arc::new(ChannelProvider::from_config(&config.channel).await?);
//!
//! let executor = PlanExecutor::from_config(channel, &config);
//! executor.prepare().await?;
//!
//! let plan = Plan::new(vec![SkillCall::new("pick").with_argument("object", "tube_blue")]);
//! let report = executor.invoke(plan).await?;
//! println!("{} after {} dispatches", report.outcome, report.dispatches.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod messaging;
pub mod plan;
pub mod test_utils;
pub mod worker;

pub use error::{RelayError, Result};
pub use execution::{PlanExecutor, RunOutcome, RunReport};
pub use plan::{Plan, SkillCall};
