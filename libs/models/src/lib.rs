//! Model clients.
//!
//! The router depends on four narrow capabilities, one method each; concrete
//! adapters are data over a shared `reqwest::Client`, not an inheritance
//! tree. Speech-to-text follows the same shape for the transcription worker.

pub mod deepseek;
pub mod gemini;
pub mod history;
pub mod openai;
pub mod whisper;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

pub use deepseek::DeepSeekModel;
pub use gemini::GeminiChat;
pub use history::{ChatTurn, Role};
pub use openai::{EMBEDDING_DIM, EMBEDDING_MODEL, OpenAiEmbeddings};
pub use whisper::WhisperHttpTranscriber;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model transport error: {0}")]
    Transport(String),
    #[error("model API responded {status}: {message}")]
    Api { status: u16, message: String },
    #[error("could not decode model response: {0}")]
    Decode(String),
}

impl vox_retry::Retryable for ModelError {
    fn is_retriable(&self) -> bool {
        match self {
            ModelError::Transport(_) => true,
            ModelError::Api { status, .. } => *status == 429 || *status >= 500,
            ModelError::Decode(_) => false,
        }
    }
}

impl ModelError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        ModelError::Transport(err.to_string())
    }
}

/// General conversational model; serves `chat` turns and the fallback for
/// unknown task labels.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn respond(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, ModelError>;
}

/// Reasoning-oriented model for the `analysis` task.
#[async_trait]
pub trait AnalysisModel: Send + Sync {
    async fn respond(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, ModelError>;
}

/// Deterministic model for the `extraction` task (temperature 0).
#[async_trait]
pub trait ExtractionModel: Send + Sync {
    async fn respond(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, ModelError>;
}

/// Text embeddings, batched; the same model embeds documents and queries so
/// their vectors live in one space.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;
}

/// Speech-to-text over a prepared WAV file.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path, language: &str) -> Result<String, ModelError>;
}

pub type SharedChatModel = Arc<dyn ChatModel>;
pub type SharedAnalysisModel = Arc<dyn AnalysisModel>;
pub type SharedExtractionModel = Arc<dyn ExtractionModel>;
pub type SharedEmbeddingModel = Arc<dyn EmbeddingModel>;
pub type SharedSpeechToText = Arc<dyn SpeechToText>;
