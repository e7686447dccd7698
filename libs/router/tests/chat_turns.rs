use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use vox_db::{AgentStatus, Database, MemoryDatabase, NewAgent, NewChunk, SharedDatabase};
use vox_models::{
    AnalysisModel, ChatModel, ChatTurn, EmbeddingModel, ExtractionModel, ModelError,
};
use vox_router::{NO_AGENT_REPLY, PAUSED_REPLY, ProcessMessage, RagConfig, TaskRouter};

#[derive(Default)]
struct RecordingModel {
    label: &'static str,
    calls: Mutex<Vec<(String, Vec<ChatTurn>)>>,
}

impl RecordingModel {
    fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, prompt: &str, history: &[ChatTurn]) -> String {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), history.to_vec()));
        format!("{} reply", self.label)
    }

    fn calls(&self) -> Vec<(String, Vec<ChatTurn>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for RecordingModel {
    async fn respond(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, ModelError> {
        Ok(self.record(prompt, history))
    }
}

#[async_trait]
impl AnalysisModel for RecordingModel {
    async fn respond(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, ModelError> {
        Ok(self.record(prompt, history))
    }
}

#[async_trait]
impl ExtractionModel for RecordingModel {
    async fn respond(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, ModelError> {
        Ok(self.record(prompt, history))
    }
}

/// Embeds every text as the same unit vector, so any seeded chunk with that
/// vector matches at similarity 1.0.
struct FixedEmbeddings {
    vector: Vec<f32>,
    calls: Mutex<usize>,
}

impl FixedEmbeddings {
    fn new(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            calls: Mutex::new(0),
        })
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl EmbeddingModel for FixedEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        *self.calls.lock().unwrap() += 1;
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

struct Harness {
    process: ProcessMessage,
    db: MemoryDatabase,
    chat: Arc<RecordingModel>,
    analysis: Arc<RecordingModel>,
    extraction: Arc<RecordingModel>,
    embeddings: Arc<FixedEmbeddings>,
}

fn harness() -> Harness {
    let db = MemoryDatabase::new();
    let shared: SharedDatabase = Arc::new(db.clone());
    let chat = RecordingModel::new("chat");
    let analysis = RecordingModel::new("analysis");
    let extraction = RecordingModel::new("extraction");
    let embeddings = FixedEmbeddings::new(vec![1.0, 0.0, 0.0]);

    let router = TaskRouter::new(
        analysis.clone(),
        extraction.clone(),
        chat.clone(),
        embeddings.clone(),
        shared.clone(),
        RagConfig::default(),
    );

    Harness {
        process: ProcessMessage::new(router, shared),
        db,
        chat,
        analysis,
        extraction,
        embeddings,
    }
}

fn agent_config(task: &str) -> NewAgent {
    NewAgent {
        name: "support".into(),
        base_prompt: "You are a support agent.".into(),
        guardrails: None,
        config: serde_json::json!({ "task": task }),
    }
}

#[tokio::test]
async fn missing_agent_returns_fixed_reply_without_models() {
    let h = harness();
    let reply = h.process.execute("u1", "hola").await.unwrap();
    assert_eq!(reply, NO_AGENT_REPLY);
    assert!(h.chat.calls().is_empty());
    assert!(h.analysis.calls().is_empty());
    assert_eq!(h.embeddings.call_count(), 0);
    assert!(h.db.turns_for_user("u1").await.is_empty());
}

#[tokio::test]
async fn paused_agent_returns_fixed_reply_but_logs_the_turn() {
    let h = harness();
    h.db.seed_agent("u1", agent_config("chat"), AgentStatus::Paused)
        .await;

    let reply = h.process.execute("u1", "hola").await.unwrap();
    assert_eq!(reply, PAUSED_REPLY);
    assert!(h.chat.calls().is_empty());
    assert_eq!(h.embeddings.call_count(), 0);

    let turns = h.db.turns_for_user("u1").await;
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user_message, "hola");
    assert_eq!(turns[0].bot_response, PAUSED_REPLY);
}

#[tokio::test]
async fn chat_task_without_documents_omits_context() {
    let h = harness();
    h.db.seed_agent("u1", agent_config("chat"), AgentStatus::Active)
        .await;

    let reply = h.process.execute("u1", "how are you?").await.unwrap();
    assert_eq!(reply, "chat reply");

    let calls = h.chat.calls();
    assert_eq!(calls.len(), 1);
    let prompt = &calls[0].0;
    assert!(!prompt.contains("--- Relevant Information ---"));
    assert!(prompt.contains("User Query: how are you?"));
    assert_eq!(h.embeddings.call_count(), 1);
}

#[tokio::test]
async fn chat_task_with_matching_chunk_injects_it() {
    let h = harness();
    let agent = h
        .db
        .seed_agent("u1", agent_config("chat"), AgentStatus::Active)
        .await;
    h.db.insert_chunks(&[NewChunk {
        document_id: "d1".into(),
        user_id: "u1".into(),
        content: "our refund window is 30 days".into(),
        embedding: vec![1.0, 0.0, 0.0],
    }])
    .await
    .unwrap();

    let reply = h
        .process
        .execute("u1", "how long do I have to get a refund?")
        .await
        .unwrap();
    assert_eq!(reply, "chat reply");

    let calls = h.chat.calls();
    let prompt = &calls[0].0;
    assert!(prompt.contains("--- Relevant Information ---"));
    assert!(prompt.contains("our refund window is 30 days"));

    // The exchange is logged against the agent.
    let turns = h.db.turns_for_user("u1").await;
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].bot_response, "chat reply");
    let _ = agent;
}

#[tokio::test]
async fn analysis_task_uses_analysis_model_without_rag() {
    let h = harness();
    h.db.seed_agent("u1", agent_config("analysis"), AgentStatus::Active)
        .await;

    let reply = h.process.execute("u1", "explain the trend").await.unwrap();
    assert_eq!(reply, "analysis reply");
    assert_eq!(h.analysis.calls().len(), 1);
    assert_eq!(h.analysis.calls()[0].0, "explain the trend");
    assert!(h.chat.calls().is_empty());
    assert_eq!(h.embeddings.call_count(), 0);
}

#[tokio::test]
async fn extraction_task_uses_extraction_model() {
    let h = harness();
    h.db.seed_agent("u1", agent_config("extraction"), AgentStatus::Active)
        .await;

    let reply = h.process.execute("u1", "pull out the dates").await.unwrap();
    assert_eq!(reply, "extraction reply");
    assert_eq!(h.extraction.calls().len(), 1);
    assert_eq!(h.embeddings.call_count(), 0);
}

#[tokio::test]
async fn unknown_task_falls_back_to_chat_without_rag() {
    let h = harness();
    h.db.seed_agent("u1", agent_config("summarize"), AgentStatus::Active)
        .await;

    let reply = h.process.execute("u1", "hola").await.unwrap();
    assert_eq!(reply, "chat reply");
    let calls = h.chat.calls();
    assert_eq!(calls.len(), 1);
    // No prompt assembly on the fallback path: the raw query goes through.
    assert_eq!(calls[0].0, "hola");
    assert_eq!(h.embeddings.call_count(), 0);
}

#[tokio::test]
async fn history_is_flattened_and_capped() {
    let h = harness();
    let agent = h
        .db
        .seed_agent("u1", agent_config("chat"), AgentStatus::Active)
        .await;
    for i in 0..12 {
        h.db.log_turn(&agent.id, "u1", &format!("q{i}"), &format!("r{i}"))
            .await
            .unwrap();
    }

    h.process.execute("u1", "latest question").await.unwrap();

    let calls = h.chat.calls();
    let history = &calls[0].1;
    // 10 most recent turns, two chat entries each.
    assert_eq!(history.len(), 20);
    assert_eq!(history[0], ChatTurn::user("q2"));
    assert_eq!(history[19], ChatTurn::model("r11"));
}

#[tokio::test]
async fn log_failure_does_not_fail_the_turn() {
    let h = harness();
    h.db.seed_agent("u1", agent_config("chat"), AgentStatus::Active)
        .await;
    h.db.fail_log_turn(true).await;

    let reply = h.process.execute("u1", "hola").await.unwrap();
    assert_eq!(reply, "chat reply");
}
