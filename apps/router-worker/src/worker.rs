use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use vox_core::{MESSAGE_OUT_STREAM, MessageEnvelope, ReplyEnvelope};
use vox_retry::Retryable;
use vox_router::ProcessMessage;
use vox_stream::{HandlerError, SharedStreamStore, StageHandler, StreamEntry, StreamStore};

/// Runs one chat turn per `transcribed_message` entry and publishes the
/// reply onto `events:message_out` for the gateway egress to deliver.
pub struct ReplyHandler {
    store: SharedStreamStore,
    process: Arc<ProcessMessage>,
}

impl ReplyHandler {
    pub fn new(store: SharedStreamStore, process: Arc<ProcessMessage>) -> Self {
        Self { store, process }
    }
}

#[async_trait]
impl StageHandler for ReplyHandler {
    async fn handle(&self, entry: &StreamEntry) -> Result<(), HandlerError> {
        let envelope =
            MessageEnvelope::from_fields(&entry.fields).map_err(HandlerError::terminal)?;

        let reply = self
            .process
            .execute(&envelope.user_id, &envelope.body)
            .await
            .map_err(|err| {
                if err.is_retriable() {
                    HandlerError::transient(anyhow::Error::new(err))
                } else {
                    HandlerError::terminal(anyhow::Error::new(err))
                }
            })?;

        let out = ReplyEnvelope {
            user_id: envelope.user_id.clone(),
            chat_id: envelope.chat_id.clone(),
            body: reply,
        };
        self.store
            .publish(MESSAGE_OUT_STREAM, &out.to_fields())
            .await
            .map_err(|err| HandlerError::transient(anyhow::Error::new(err)))?;

        info!(user_id = %envelope.user_id, chat_id = %envelope.chat_id, "reply published");
        Ok(())
    }
}
