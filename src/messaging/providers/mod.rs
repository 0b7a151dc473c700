//! # Message Channel Providers
//!
//! Concrete implementations of the `MessageChannel` trait.
//!
//! ## Providers
//!
//! - [`RedisChannel`] - Redis streams via the `redis` crate
//! - [`InMemoryChannel`] - Thread-safe in-memory streams for testing

mod in_memory;
mod redis;

pub use self::redis::RedisChannel;
pub use in_memory::InMemoryChannel;
