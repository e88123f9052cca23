//! EventPublisher implementations.
//!
//! - `LogPublisher` - writes events to the tracing log (development)
//! - `RedisStreamPublisher` - appends events to a Redis stream (production)
//! - `InMemoryPublisher` - records events, scriptable failures (tests)

mod in_memory;
mod log;
mod redis;

pub use self::in_memory::{InMemoryPublisher, PublishedEvent};
pub use self::log::LogPublisher;
pub use self::redis::{RedisStreamConfig, RedisStreamPublisher};
