//! DeepSeek chat-completions adapter.
//!
//! One struct, two presets: the reasoner model serves `analysis` turns and
//! the chat model with temperature pinned to zero serves `extraction`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::{AnalysisModel, ChatTurn, ExtractionModel, ModelError, Role};

const DEFAULT_BASE: &str = "https://api.deepseek.com";
const REASONER_MODEL: &str = "deepseek-reasoner";
const CHAT_MODEL: &str = "deepseek-chat";

pub struct DeepSeekModel {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl DeepSeekModel {
    /// Reasoning preset for the `analysis` task.
    pub fn reasoner(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE.into(),
            model: REASONER_MODEL.into(),
            temperature: None,
        }
    }

    /// Deterministic preset for the `extraction` task.
    pub fn extractor(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE.into(),
            model: CHAT_MODEL.into(),
            temperature: Some(0.0),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn body(&self, prompt: &str, history: &[ChatTurn]) -> Value {
        let mut messages: Vec<Value> = history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Model => "assistant",
                };
                json!({ "role": role, "content": turn.text })
            })
            .collect();
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut body = json!({ "model": self.model, "messages": messages });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    async fn complete(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&self.body(prompt, history))
            .send()
            .await
            .map_err(ModelError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| ModelError::Decode(err.to_string()))?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ModelError::Decode("no choices in response".into()))
    }
}

#[async_trait]
impl AnalysisModel for DeepSeekModel {
    async fn respond(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, ModelError> {
        self.complete(prompt, history).await
    }
}

#[async_trait]
impl ExtractionModel for DeepSeekModel {
    async fn respond(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, ModelError> {
        self.complete(prompt, history).await
    }
}
