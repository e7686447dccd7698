use async_trait::async_trait;
use tracing::info;

use crate::audio::{self, Container, MAX_AUDIO_BYTES};
use vox_core::{MessageEnvelope, TRANSCRIBED_MESSAGE_STREAM};
use vox_models::{SharedSpeechToText, SpeechToText};
use vox_retry::Retryable;
use vox_storage::{BlobStore, SharedBlobStore, StorageError};
use vox_stream::{HandlerError, SharedStreamStore, StageHandler, StreamEntry, StreamStore};

/// Turns `new_message` entries into `transcribed_message` entries.
///
/// Text messages pass straight through with `transcribed="false"`. Messages
/// with a media key get their audio fetched, converted and run through ASR.
/// Blob fetch and publish failures are transient (the runner retries the
/// whole handler); ASR failures are terminal, since the same audio will fail
/// the same way again.
pub struct TranscriptionHandler {
    store: SharedStreamStore,
    blob: SharedBlobStore,
    asr: SharedSpeechToText,
    language: String,
}

impl TranscriptionHandler {
    pub fn new(
        store: SharedStreamStore,
        blob: SharedBlobStore,
        asr: SharedSpeechToText,
        language: String,
    ) -> Self {
        Self {
            store,
            blob,
            asr,
            language,
        }
    }

    async fn transcribe_media(&self, media_key: &str) -> Result<String, HandlerError> {
        let size = self.blob.size(media_key).await.map_err(storage_error)?;
        if size > MAX_AUDIO_BYTES {
            return Err(HandlerError::terminal(anyhow::anyhow!(
                "voice note '{media_key}' is {size} bytes, limit is {MAX_AUDIO_BYTES}"
            )));
        }

        let data = self.blob.get(media_key).await.map_err(storage_error)?;
        let container = audio::detect_container(&data).map_err(HandlerError::terminal)?;

        let source = tempfile::Builder::new()
            .prefix("voxflow-note-")
            .suffix(match container {
                Container::Ogg => ".ogg",
                Container::Wav => ".wav",
            })
            .tempfile()
            .map_err(|err| HandlerError::transient(anyhow::Error::new(err)))?;
        tokio::fs::write(source.path(), &data)
            .await
            .map_err(|err| HandlerError::transient(anyhow::Error::new(err)))?;

        // Both temp files live until the end of this scope, so every exit
        // path cleans them up.
        let converted;
        let wav_path = match container {
            Container::Ogg => {
                converted = audio::convert_ogg_to_wav(source.path())
                    .await
                    .map_err(HandlerError::terminal)?;
                converted.path()
            }
            Container::Wav => source.path(),
        };

        let text = self
            .asr
            .transcribe(wav_path, &self.language)
            .await
            .map_err(|err| HandlerError::terminal(anyhow::Error::new(err)))?;
        Ok(text)
    }
}

fn storage_error(err: StorageError) -> HandlerError {
    if err.is_retriable() {
        HandlerError::transient(anyhow::Error::new(err))
    } else {
        HandlerError::terminal(anyhow::Error::new(err))
    }
}

#[async_trait]
impl StageHandler for TranscriptionHandler {
    async fn handle(&self, entry: &StreamEntry) -> Result<(), HandlerError> {
        let mut envelope =
            MessageEnvelope::from_fields(&entry.fields).map_err(HandlerError::terminal)?;

        if envelope.has_media() {
            let text = self.transcribe_media(&envelope.media_key).await?;
            info!(user_id = %envelope.user_id, chars = text.len(), "transcription complete");
            envelope.body = text;
            envelope.transcribed = true;
        } else {
            envelope.transcribed = false;
        }

        self.store
            .publish(TRANSCRIBED_MESSAGE_STREAM, &envelope.to_fields())
            .await
            .map_err(|err| HandlerError::transient(anyhow::Error::new(err)))?;
        info!(user_id = %envelope.user_id, transcribed = envelope.transcribed, "message forwarded");
        Ok(())
    }
}
