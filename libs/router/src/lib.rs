//! The chat-turn core: pick the model for a task label, assemble its prompt
//! (including retrieval for `chat`), and run the turn against the agent's
//! configuration and history.

pub mod process;
pub mod router;

pub use process::{HISTORY_LIMIT, NO_AGENT_REPLY, PAUSED_REPLY, ProcessMessage};
pub use router::{RagConfig, TaskRouter, flatten_history};

use vox_db::DbError;
use vox_models::ModelError;
use vox_retry::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl Retryable for RouterError {
    fn is_retriable(&self) -> bool {
        match self {
            RouterError::Model(err) => err.is_retriable(),
            RouterError::Db(err) => err.is_retriable(),
        }
    }
}
