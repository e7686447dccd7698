//! PostgREST-style HTTP implementation of [`Database`].
//!
//! Every table is a `/rest/v1/{table}` resource filtered with `eq.` query
//! operators; the vector search and the credit decrement are stored
//! procedures exposed under `/rest/v1/rpc/`. The service key bypasses
//! row-level security, so user scoping happens in the query parameters.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::types::*;
use crate::{Database, DbError};
use vox_core::DbConfig;

const MATCH_CHUNKS_RPC: &str = "match_document_chunks";
const DECREMENT_CREDIT_RPC: &str = "decrement_message_credit";

pub struct RestDatabase {
    http: Client,
    base_url: String,
    service_key: String,
    embedding_dim: usize,
}

impl RestDatabase {
    pub fn new(config: &DbConfig, http: Client, embedding_dim: usize) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            embedding_dim,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{path}", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, DbError> {
        let response = request
            .send()
            .await
            .map_err(|err| DbError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| DbError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(DbError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body).map_err(|err| DbError::Decode(err.to_string()))
    }

    async fn send_ok(&self, request: RequestBuilder) -> Result<(), DbError> {
        let response = request
            .send()
            .await
            .map_err(|err| DbError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NO_CONTENT {
            let message = response.text().await.unwrap_or_default();
            return Err(DbError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), DbError> {
        if embedding.len() != self.embedding_dim {
            return Err(DbError::DimensionMismatch {
                expected: self.embedding_dim,
                got: embedding.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Database for RestDatabase {
    async fn agent_for_user(&self, user_id: &str) -> Result<Option<Agent>, DbError> {
        let agents: Vec<Agent> = self
            .send(self.request(Method::GET, "agents").query(&[
                ("user_id", format!("eq.{user_id}").as_str()),
                ("order", "created_at.asc"),
                ("limit", "1"),
            ]))
            .await?;
        Ok(agents.into_iter().next())
    }

    async fn agents_for_user(&self, user_id: &str) -> Result<Vec<Agent>, DbError> {
        self.send(self.request(Method::GET, "agents").query(&[
            ("user_id", format!("eq.{user_id}").as_str()),
            ("order", "created_at.asc"),
        ]))
        .await
    }

    async fn upsert_agent(&self, user_id: &str, agent: &NewAgent) -> Result<Agent, DbError> {
        let body = json!({
            "user_id": user_id,
            "name": agent.name,
            "base_prompt": agent.base_prompt,
            "guardrails": agent.guardrails,
            "status": "active",
            "config": agent.config,
        });

        let existing = self.agent_for_user(user_id).await?;
        let rows: Vec<Agent> = match existing {
            Some(current) => {
                self.send(
                    self.request(Method::PATCH, "agents")
                        .query(&[("id", format!("eq.{}", current.id).as_str())])
                        .header("Prefer", "return=representation")
                        .json(&body),
                )
                .await?
            }
            None => {
                self.send(
                    self.request(Method::POST, "agents")
                        .header("Prefer", "return=representation")
                        .json(&body),
                )
                .await?
            }
        };
        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::Decode("agent upsert returned no row".into()))
    }

    async fn set_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<bool, DbError> {
        let rows: Vec<Agent> = self
            .send(
                self.request(Method::PATCH, "agents")
                    .query(&[("id", format!("eq.{agent_id}").as_str())])
                    .header("Prefer", "return=representation")
                    .json(&json!({ "status": status })),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn create_document(&self, document: &NewDocument) -> Result<Document, DbError> {
        let rows: Vec<Document> = self
            .send(
                self.request(Method::POST, "documents")
                    .header("Prefer", "return=representation")
                    .json(&json!({
                        "user_id": document.user_id,
                        "agent_id": document.agent_id,
                        "file_name": document.file_name,
                        "storage_path": document.storage_path,
                        "status": "pending",
                    })),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::Decode("document insert returned no row".into()))
    }

    async fn documents_for_user(&self, user_id: &str) -> Result<Vec<Document>, DbError> {
        self.send(self.request(Method::GET, "documents").query(&[
            ("user_id", format!("eq.{user_id}").as_str()),
            ("order", "created_at.desc"),
        ]))
        .await
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), DbError> {
        self.send_ok(
            self.request(Method::DELETE, "documents")
                .query(&[("id", format!("eq.{document_id}").as_str())]),
        )
        .await
    }

    async fn set_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
    ) -> Result<(), DbError> {
        self.send_ok(
            self.request(Method::PATCH, "documents")
                .query(&[("id", format!("eq.{document_id}").as_str())])
                .json(&json!({ "status": status })),
        )
        .await
    }

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<(), DbError> {
        for chunk in chunks {
            self.check_dimension(&chunk.embedding)?;
        }
        self.send_ok(
            self.request(Method::POST, "document_chunks")
                .json(&chunks.iter().collect::<Vec<_>>()),
        )
        .await
    }

    async fn conversation_history(
        &self,
        agent_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, DbError> {
        let mut turns: Vec<ConversationTurn> = self
            .send(self.request(Method::GET, "conversations").query(&[
                ("select", "user_message,bot_response,created_at"),
                ("agent_id", format!("eq.{agent_id}").as_str()),
                ("user_id", format!("eq.{user_id}").as_str()),
                ("order", "created_at.desc"),
                ("limit", limit.to_string().as_str()),
            ]))
            .await?;
        // The query returns newest-first; models want chronological order.
        turns.reverse();
        Ok(turns)
    }

    async fn log_turn(
        &self,
        agent_id: &str,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
    ) -> Result<(), DbError> {
        self.send_ok(self.request(Method::POST, "conversations").json(&json!({
            "agent_id": agent_id,
            "user_id": user_id,
            "user_message": user_message,
            "bot_response": bot_response,
        })))
        .await
    }

    async fn match_chunks(
        &self,
        user_id: &str,
        embedding: &[f32],
        threshold: f32,
        count: usize,
    ) -> Result<Vec<ChunkMatch>, DbError> {
        self.check_dimension(embedding)?;
        self.send(
            self.request(Method::POST, &format!("rpc/{MATCH_CHUNKS_RPC}"))
                .json(&json!({
                    "p_user_id": user_id,
                    "query_embedding": embedding,
                    "match_threshold": threshold,
                    "match_count": count,
                })),
        )
        .await
    }

    async fn decrement_credit(&self, user_id: &str) -> Result<bool, DbError> {
        let granted: Value = self
            .send(
                self.request(Method::POST, &format!("rpc/{DECREMENT_CREDIT_RPC}"))
                    .json(&json!({ "p_user_id": user_id })),
            )
            .await?;
        Ok(granted.as_bool().unwrap_or(false))
    }

    async fn ping(&self) -> Result<(), DbError> {
        let _rows: Vec<Value> = self
            .send(
                self.request(Method::GET, "agents")
                    .query(&[("select", "id"), ("limit", "1")]),
            )
            .await?;
        Ok(())
    }
}
