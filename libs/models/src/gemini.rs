//! Gemini `generateContent` adapter, the pipeline's general chat model.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::{ChatModel, ChatTurn, ModelError, Role};

const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub struct GeminiChat {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiChat {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE.into(),
            model: DEFAULT_MODEL.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// History turns followed by the prompt as the final user content.
fn contents(prompt: &str, history: &[ChatTurn]) -> Value {
    let mut contents: Vec<Value> = history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Model => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.text }] })
        })
        .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": prompt }] }));
    json!({ "contents": contents })
}

#[async_trait]
impl ChatModel for GeminiChat {
    async fn respond(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, ModelError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&contents(prompt, history))
            .send()
            .await
            .map_err(ModelError::from_reqwest)?;

        let status = response.status();
        let body: Value = if status.is_success() {
            response
                .json()
                .await
                .map_err(|err| ModelError::Decode(err.to_string()))?
        } else {
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        };

        let text = body["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ModelError::Decode("no candidates in response".into()))?;
        Ok(text)
    }
}
