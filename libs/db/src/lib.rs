//! Data access for agents, documents, chunks and conversation turns, plus
//! the vector-search RPC and the credit counter.
//!
//! The [`Database`] trait is the seam: the workers and the gateway talk to
//! it, [`RestDatabase`] speaks a PostgREST-style HTTP API in production, and
//! [`MemoryDatabase`] backs the tests.

pub mod memory;
pub mod rest;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use memory::MemoryDatabase;
pub use rest::RestDatabase;
pub use types::{
    Agent, AgentStatus, ChunkMatch, ConversationTurn, Document, DocumentStatus, NewAgent,
    NewChunk, NewDocument,
};

pub type SharedDatabase = Arc<dyn Database>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database transport error: {0}")]
    Transport(String),
    #[error("database responded {status}: {message}")]
    Api { status: u16, message: String },
    #[error("could not decode database response: {0}")]
    Decode(String),
    #[error("embedding has {got} dimensions, column expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl vox_retry::Retryable for DbError {
    fn is_retriable(&self) -> bool {
        match self {
            DbError::Transport(_) => true,
            DbError::Api { status, .. } => *status == 429 || *status >= 500,
            DbError::Decode(_) | DbError::DimensionMismatch { .. } => false,
        }
    }
}

#[async_trait]
pub trait Database: Send + Sync {
    /// The user's agent. With several agents configured, the first by
    /// creation time wins.
    async fn agent_for_user(&self, user_id: &str) -> Result<Option<Agent>, DbError>;
    async fn agents_for_user(&self, user_id: &str) -> Result<Vec<Agent>, DbError>;
    /// Creates the user's agent or replaces its configuration in place.
    async fn upsert_agent(&self, user_id: &str, agent: &NewAgent) -> Result<Agent, DbError>;
    /// Returns `false` when no such agent exists.
    async fn set_agent_status(&self, agent_id: &str, status: AgentStatus)
    -> Result<bool, DbError>;

    async fn create_document(&self, document: &NewDocument) -> Result<Document, DbError>;
    /// Newest first.
    async fn documents_for_user(&self, user_id: &str) -> Result<Vec<Document>, DbError>;
    async fn delete_document(&self, document_id: &str) -> Result<(), DbError>;
    async fn set_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
    ) -> Result<(), DbError>;

    /// One batch insert; a document only completes once all of its chunks
    /// are durably stored.
    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<(), DbError>;

    /// Most recent `limit` turns, oldest first.
    async fn conversation_history(
        &self,
        agent_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DbError>;
    async fn log_turn(
        &self,
        agent_id: &str,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
    ) -> Result<(), DbError>;

    /// Cosine similarity search over the user's chunks, descending, capped
    /// at `count` and filtered by `threshold`.
    async fn match_chunks(
        &self,
        user_id: &str,
        embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<ChunkMatch>, DbError>;

    /// Atomically spends one message credit. `false` means exhausted.
    async fn decrement_credit(&self, user_id: &str) -> Result<bool, DbError>;

    async fn ping(&self) -> Result<(), DbError>;
}
