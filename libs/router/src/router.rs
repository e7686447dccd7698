use tracing::{debug, info, warn};

use crate::RouterError;
use vox_db::{Agent, ChunkMatch, ConversationTurn, Database, SharedDatabase};
use vox_models::{
    AnalysisModel, ChatModel, ChatTurn, EmbeddingModel, ExtractionModel, SharedAnalysisModel,
    SharedChatModel, SharedEmbeddingModel, SharedExtractionModel,
};

/// Retrieval settings for the `chat` task.
#[derive(Debug, Clone, Copy)]
pub struct RagConfig {
    pub threshold: f32,
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            top_k: 5,
        }
    }
}

/// Flattens stored turns into the alternating user/model list models expect,
/// preserving chronological order.
pub fn flatten_history(turns: &[ConversationTurn]) -> Vec<ChatTurn> {
    let mut history = Vec::with_capacity(turns.len() * 2);
    for turn in turns {
        history.push(ChatTurn::user(&turn.user_message));
        history.push(ChatTurn::model(&turn.bot_response));
    }
    history
}

/// Selects the model for a task label and assembles its prompt. Exhaustive
/// and deterministic: the same label always reaches the same model.
pub struct TaskRouter {
    analysis: SharedAnalysisModel,
    extraction: SharedExtractionModel,
    chat: SharedChatModel,
    embeddings: SharedEmbeddingModel,
    db: SharedDatabase,
    rag: RagConfig,
}

impl TaskRouter {
    pub fn new(
        analysis: SharedAnalysisModel,
        extraction: SharedExtractionModel,
        chat: SharedChatModel,
        embeddings: SharedEmbeddingModel,
        db: SharedDatabase,
        rag: RagConfig,
    ) -> Self {
        Self {
            analysis,
            extraction,
            chat,
            embeddings,
            db,
            rag,
        }
    }

    pub async fn route(
        &self,
        user_id: &str,
        query: &str,
        history: &[ChatTurn],
        task: &str,
        agent: &Agent,
    ) -> Result<String, RouterError> {
        match task {
            "analysis" => {
                debug!(user_id, "routing to analysis model");
                Ok(self.analysis.respond(query, history).await?)
            }
            "extraction" => {
                debug!(user_id, "routing to extraction model");
                Ok(self.extraction.respond(query, history).await?)
            }
            "chat" => self.chat_with_rag(user_id, query, history, agent).await,
            other => {
                warn!(user_id, task = other, "unknown task label, defaulting to chat model");
                Ok(self.chat.respond(query, history).await?)
            }
        }
    }

    async fn chat_with_rag(
        &self,
        user_id: &str,
        query: &str,
        history: &[ChatTurn],
        agent: &Agent,
    ) -> Result<String, RouterError> {
        let embeddings = self.embeddings.embed(&[query.to_string()]).await?;
        let query_embedding = embeddings
            .into_iter()
            .next()
            .unwrap_or_default();

        let chunks = self
            .db
            .match_chunks(user_id, &query_embedding, self.rag.threshold, self.rag.top_k)
            .await?;
        info!(user_id, matched = chunks.len(), "retrieved context chunks");

        let prompt = compose_prompt(agent, &chunks, query);
        Ok(self.chat.respond(&prompt, history).await?)
    }
}

/// Final prompt layout. The context section appears only when retrieval
/// found something; guardrails, when configured, always lead.
pub fn compose_prompt(agent: &Agent, chunks: &[ChunkMatch], query: &str) -> String {
    let mut prompt = String::new();
    if let Some(guardrails) = agent.guardrails.as_deref().filter(|g| !g.is_empty()) {
        prompt.push_str(&format!("Guardrails (must follow):\n{guardrails}\n\n"));
    }
    prompt.push_str(&agent.base_prompt);
    prompt.push_str("\n\n");
    if !chunks.is_empty() {
        prompt.push_str("--- Relevant Information ---\n");
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        prompt.push_str(&contents.join("\n\n"));
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!("User Query: {query}"));
    prompt
}
