//! OpenAI embeddings adapter. Documents and queries must share this model so
//! their vectors are comparable.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::{EmbeddingModel, ModelError};

const DEFAULT_BASE: &str = "https://api.openai.com/v1";
pub const EMBEDDING_MODEL: &str = "text-embedding-3-large";
/// Output width of [`EMBEDDING_MODEL`]; the chunk column is sized to match.
pub const EMBEDDING_DIM: usize = 3072;

pub struct OpenAiEmbeddings {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE.into(),
            model: EMBEDDING_MODEL.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
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
        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|err| ModelError::Decode(err.to_string()))?;
        if parsed.data.len() != texts.len() {
            return Err(ModelError::Decode(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        // The API is not required to preserve input order.
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}
