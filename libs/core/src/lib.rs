//! Shared types for the Voxflow pipeline: the wire envelope carried on the
//! event streams, the canonical stream/group names, and process settings.

pub mod config;
pub mod envelope;
pub mod streams;

pub use config::{AsrConfig, BlobConfig, DbConfig, ModelKeys, Settings};
pub use envelope::{DocumentEvent, EnvelopeError, MessageEnvelope, ReplyEnvelope};
pub use streams::*;
