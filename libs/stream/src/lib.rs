//! The streaming fabric: a small [`StreamStore`] abstraction over the broker
//! (streams with consumer groups, the durable operator list, and rate-limit
//! counters), a Redis implementation and an in-memory twin for tests, plus
//! the [`StageRunner`] consumer loop every worker is built on.

pub mod client;
pub mod entry;
pub mod healthbeat;
pub mod memory;
pub mod redis_store;
pub mod runner;

pub use client::{SharedStreamStore, StreamStore};
pub use entry::StreamEntry;
pub use healthbeat::Healthbeat;
pub use memory::MemoryStreamStore;
pub use redis_store::RedisStreamStore;
pub use runner::{FailureSink, HandlerError, StageConfig, StageHandler, StageRunner};

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("broker connection error: {0}")]
    Connection(String),
    #[error("broker command error: {0}")]
    Command(String),
    #[error("malformed stream entry: {0}")]
    Decode(String),
}

impl vox_retry::Retryable for StreamError {
    fn is_retriable(&self) -> bool {
        matches!(self, StreamError::Connection(_) | StreamError::Command(_))
    }
}
