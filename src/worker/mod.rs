//! # Worker
//!
//! The worker bridge and the skill execution seam it drives.

mod bridge;
mod executor;

pub use bridge::WorkerBridge;
pub use executor::{SimulatedExecutor, SkillExecutor, SkillVerdict};
