//! Canonical stream, consumer-group and list names.
//!
//! All names are fixed: the stage topology is static and every worker and the
//! gateway must agree on them.

/// Raw inbound messages published by the gateway.
pub const NEW_MESSAGE_STREAM: &str = "events:new_message";
/// Messages whose media (if any) has been transcribed to text.
pub const TRANSCRIBED_MESSAGE_STREAM: &str = "events:transcribed_message";
/// Replies ready for delivery back to the messaging gateway.
pub const MESSAGE_OUT_STREAM: &str = "events:message_out";
/// Uploaded documents awaiting chunking and embedding.
pub const NEW_DOCUMENT_STREAM: &str = "events:new_document";
/// Shared dead-letter stream fed by every worker on terminal failure.
pub const DEAD_LETTER_STREAM: &str = "events:dead_letter_queue";
/// Durable operator-visible list of quarantined messages.
pub const DLQ_PERSISTENT_LIST: &str = "dlq:persistent_failures";

pub const TRANSCRIPTION_GROUP: &str = "group:transcription-workers";
pub const ROUTER_GROUP: &str = "group:main-api";
pub const EMBEDDING_GROUP: &str = "group:embedding-worker";
pub const DLQ_MONITOR_GROUP: &str = "group:dlq-monitor";

/// Approximate upper bound applied to every stream via `MAXLEN ~`.
pub const STREAM_MAXLEN: usize = 10_000;

/// Consumer name unique to this process within its group.
pub fn consumer_name(service: &str) -> String {
    format!("consumer:{service}-{}", std::process::id())
}
