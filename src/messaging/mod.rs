//! # Messaging Module
//!
//! Durable task/result exchange over append-only streams with consumer groups.
//!
//! ## Architecture
//!
//! ```text
//! ChannelProvider (enum)        <- backend chosen from configuration
//!   ├── Redis(RedisChannel)
//!   └── InMemory(InMemoryChannel)
//!
//! StreamMessage                 <- flat field-map record encoding
//!   ├── TaskMessage             (robot.tasks)
//!   └── ResultMessage           (robot.events)
//! ```

pub mod errors;
pub mod message;
mod provider;
pub mod providers;
mod traits;
mod types;

pub use errors::MessagingError;
pub use message::{ResultMessage, TaskId, TaskMessage, TaskStatus};
pub use provider::ChannelProvider;
pub use providers::{InMemoryChannel, RedisChannel};
pub use traits::{MessageChannel, StreamMessage};
pub use types::{RecordId, StreamEntry, StreamFields, StreamNames};
