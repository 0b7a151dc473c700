//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use skill_relay::execution::PlanExecutor;
use skill_relay::messaging::{InMemoryChannel, StreamNames};
use skill_relay::plan::{Plan, SkillCall};

pub const CLIENT_CONSUMER: &str = "lg_1";

/// Plan whose steps are argument-less calls named after `skills`
pub fn plan_of(skills: &[&str]) -> Plan {
    skills.iter().copied().map(SkillCall::new).collect()
}

pub fn in_memory_executor(channel: &Arc<InMemoryChannel>) -> PlanExecutor<InMemoryChannel> {
    PlanExecutor::new(Arc::clone(channel), StreamNames::default(), CLIENT_CONSUMER)
}
