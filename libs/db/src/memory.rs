//! In-memory [`Database`] for tests: same contract as the REST
//! implementation, including real cosine-similarity chunk matching so RAG
//! paths can be exercised end to end.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::types::*;
use crate::{Database, DbError};

#[derive(Default)]
struct State {
    agents: Vec<Agent>,
    documents: Vec<Document>,
    chunks: Vec<NewChunk>,
    turns: Vec<(String, String, ConversationTurn)>,
    credits: HashMap<String, u32>,
    seq: u64,
    fail_log_turn: bool,
}

impl State {
    fn next_stamp(&mut self) -> String {
        self.seq += 1;
        format!("{:010}", self.seq)
    }
}

#[derive(Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
    default_credits: u32,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            default_credits: 100,
        }
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_agent(&self, user_id: &str, agent: NewAgent, status: AgentStatus) -> Agent {
        let mut state = self.state.lock().await;
        let stamp = state.next_stamp();
        let agent = Agent {
            id: format!("agent-{stamp}"),
            user_id: user_id.to_string(),
            name: agent.name,
            base_prompt: agent.base_prompt,
            guardrails: agent.guardrails,
            status,
            config: agent.config,
            created_at: stamp,
        };
        state.agents.push(agent.clone());
        agent
    }

    pub async fn set_credits(&self, user_id: &str, credits: u32) {
        self.state
            .lock()
            .await
            .credits
            .insert(user_id.to_string(), credits);
    }

    /// Makes `log_turn` fail, to exercise best-effort logging paths.
    pub async fn fail_log_turn(&self, fail: bool) {
        self.state.lock().await.fail_log_turn = fail;
    }

    pub async fn document(&self, document_id: &str) -> Option<Document> {
        self.state
            .lock()
            .await
            .documents
            .iter()
            .find(|d| d.id == document_id)
            .cloned()
    }

    pub async fn chunks_for_document(&self, document_id: &str) -> Vec<NewChunk> {
        self.state
            .lock()
            .await
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect()
    }

    pub async fn turns_for_user(&self, user_id: &str) -> Vec<ConversationTurn> {
        self.state
            .lock()
            .await
            .turns
            .iter()
            .filter(|(_, user, _)| user == user_id)
            .map(|(_, _, turn)| turn.clone())
            .collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn status_rank(status: DocumentStatus) -> u8 {
    match status {
        DocumentStatus::Pending => 0,
        DocumentStatus::Processing => 1,
        DocumentStatus::Completed => 2,
        DocumentStatus::Failed => 2,
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn agent_for_user(&self, user_id: &str) -> Result<Option<Agent>, DbError> {
        let state = self.state.lock().await;
        let mut agents: Vec<&Agent> = state
            .agents
            .iter()
            .filter(|a| a.user_id == user_id)
            .collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(agents.first().map(|a| (*a).clone()))
    }

    async fn agents_for_user(&self, user_id: &str) -> Result<Vec<Agent>, DbError> {
        let state = self.state.lock().await;
        let mut agents: Vec<Agent> = state
            .agents
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(agents)
    }

    async fn upsert_agent(&self, user_id: &str, agent: &NewAgent) -> Result<Agent, DbError> {
        let existing = self.agent_for_user(user_id).await?;
        let mut state = self.state.lock().await;
        match existing {
            Some(current) => {
                let stored = state
                    .agents
                    .iter_mut()
                    .find(|a| a.id == current.id)
                    .expect("agent disappeared under lock");
                stored.name = agent.name.clone();
                stored.base_prompt = agent.base_prompt.clone();
                stored.guardrails = agent.guardrails.clone();
                stored.config = agent.config.clone();
                stored.status = AgentStatus::Active;
                Ok(stored.clone())
            }
            None => {
                let stamp = state.next_stamp();
                let created = Agent {
                    id: format!("agent-{stamp}"),
                    user_id: user_id.to_string(),
                    name: agent.name.clone(),
                    base_prompt: agent.base_prompt.clone(),
                    guardrails: agent.guardrails.clone(),
                    status: AgentStatus::Active,
                    config: agent.config.clone(),
                    created_at: stamp,
                };
                state.agents.push(created.clone());
                Ok(created)
            }
        }
    }

    async fn set_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<bool, DbError> {
        let mut state = self.state.lock().await;
        match state.agents.iter_mut().find(|a| a.id == agent_id) {
            Some(agent) => {
                agent.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_document(&self, document: &NewDocument) -> Result<Document, DbError> {
        let mut state = self.state.lock().await;
        let stamp = state.next_stamp();
        let created = Document {
            id: format!("doc-{stamp}"),
            user_id: document.user_id.clone(),
            agent_id: document.agent_id.clone(),
            file_name: document.file_name.clone(),
            storage_path: document.storage_path.clone(),
            status: DocumentStatus::Pending,
            created_at: stamp,
        };
        state.documents.push(created.clone());
        Ok(created)
    }

    async fn documents_for_user(&self, user_id: &str) -> Result<Vec<Document>, DbError> {
        let state = self.state.lock().await;
        let mut documents: Vec<Document> = state
            .documents
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        state.documents.retain(|d| d.id != document_id);
        // Chunks cascade with their document.
        state.chunks.retain(|c| c.document_id != document_id);
        Ok(())
    }

    async fn set_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        if let Some(document) = state.documents.iter_mut().find(|d| d.id == document_id) {
            // Status only moves forward; a completed document never reverts.
            if status_rank(status) > status_rank(document.status) {
                document.status = status;
            }
        }
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        state.chunks.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn conversation_history(
        &self,
        agent_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DbError> {
        let state = self.state.lock().await;
        let mut turns: Vec<ConversationTurn> = state
            .turns
            .iter()
            .filter(|(agent, user, _)| agent == agent_id && user == user_id)
            .map(|(_, _, turn)| turn.clone())
            .collect();
        turns.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if turns.len() > limit {
            turns.drain(..turns.len() - limit);
        }
        Ok(turns)
    }

    async fn log_turn(
        &self,
        agent_id: &str,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().await;
        if state.fail_log_turn {
            return Err(DbError::Transport("conversation log unavailable".into()));
        }
        let stamp = state.next_stamp();
        state.turns.push((
            agent_id.to_string(),
            user_id.to_string(),
            ConversationTurn {
                user_message: user_message.to_string(),
                bot_response: bot_response.to_string(),
                created_at: stamp,
            },
        ));
        Ok(())
    }

    async fn match_chunks(
        &self,
        user_id: &str,
        embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<ChunkMatch>, DbError> {
        let state = self.state.lock().await;
        let mut matches: Vec<ChunkMatch> = state
            .chunks
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| ChunkMatch {
                content: c.content.clone(),
                similarity: cosine_similarity(&c.embedding, embedding),
            })
            .filter(|m| m.similarity >= threshold)
            .collect();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(count);
        Ok(matches)
    }

    async fn decrement_credit(&self, user_id: &str) -> Result<bool, DbError> {
        let default_credits = self.default_credits;
        let mut state = self.state.lock().await;
        let credits = state
            .credits
            .entry(user_id.to_string())
            .or_insert(default_credits);
        if *credits == 0 {
            return Ok(false);
        }
        *credits -= 1;
        Ok(true)
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }
}
