use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Paused,
}

/// Per-user agent configuration. `config` is free-form key/value data; the
/// router reads the task label out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub base_prompt: String,
    #[serde(default)]
    pub guardrails: Option<String>,
    pub status: AgentStatus,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub created_at: String,
}

impl Agent {
    /// Task label driving model selection; absent or non-string values mean
    /// the general chat task.
    pub fn task(&self) -> &str {
        self.config
            .get("task")
            .and_then(Value::as_str)
            .unwrap_or("chat")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub base_prompt: String,
    #[serde(default)]
    pub guardrails: Option<String>,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub file_name: String,
    pub storage_path: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub user_id: String,
    pub agent_id: String,
    pub file_name: String,
    pub storage_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChunk {
    pub document_id: String,
    pub user_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_message: String,
    pub bot_response: String,
    #[serde(default)]
    pub created_at: String,
}

/// One vector-search hit, similarity-descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub content: String,
    pub similarity: f32,
}
