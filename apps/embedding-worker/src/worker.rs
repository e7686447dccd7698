use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::{chunk, extract};
use vox_core::DocumentEvent;
use vox_db::{Database, DocumentStatus, NewChunk, SharedDatabase};
use vox_models::{EmbeddingModel, SharedEmbeddingModel};
use vox_retry::RetryPolicy;
use vox_storage::{BlobStore, SharedBlobStore};
use vox_stream::{HandlerError, StageHandler, StreamEntry};

/// Documents above this size are rejected before download.
pub const MAX_DOCUMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Processes one `new_document` event: extract text, chunk, embed, persist.
///
/// The status row is the contract with the upload API: `processing` as soon
/// as work starts, `completed` only once every chunk row is stored, `failed`
/// on any terminal error. Failures never bubble up as transient — a document
/// that cannot be processed goes to the DLQ with its status marked, rather
/// than looping through redelivery.
pub struct EmbeddingHandler {
    db: SharedDatabase,
    blob: SharedBlobStore,
    embeddings: SharedEmbeddingModel,
    fetch_retry: RetryPolicy,
    embed_retry: RetryPolicy,
}

impl EmbeddingHandler {
    pub fn new(
        db: SharedDatabase,
        blob: SharedBlobStore,
        embeddings: SharedEmbeddingModel,
    ) -> Self {
        Self {
            db,
            blob,
            embeddings,
            fetch_retry: RetryPolicy::default(),
            embed_retry: RetryPolicy::embedding(),
        }
    }

    async fn fetch_text(&self, storage_path: &str) -> Result<String> {
        let size = self
            .fetch_retry
            .run("blob-head", || self.blob.size(storage_path))
            .await
            .map_err(anyhow::Error::new)?;
        if size > MAX_DOCUMENT_BYTES {
            bail!("document '{storage_path}' is {size} bytes, limit is {MAX_DOCUMENT_BYTES}");
        }

        let data = self
            .fetch_retry
            .run("blob-fetch", || self.blob.get(storage_path))
            .await
            .map_err(anyhow::Error::new)?;

        let path = storage_path.to_string();
        tokio::task::spawn_blocking(move || extract::extract_text(&path, &data))
            .await
            .context("join text extraction")?
    }

    async fn process(&self, event: &DocumentEvent) -> Result<usize> {
        self.db
            .set_document_status(&event.document_id, DocumentStatus::Processing)
            .await
            .context("mark document processing")?;

        let text = if !event.text.is_empty() {
            event.text.clone()
        } else if !event.storage_path.is_empty() {
            self.fetch_text(&event.storage_path).await?
        } else {
            bail!("document event carries neither storage_path nor text");
        };

        let owned = text;
        let chunks = tokio::task::spawn_blocking(move || chunk::chunk_text(&owned))
            .await
            .context("join chunker")??;

        if !chunks.is_empty() {
            let embeddings = self
                .embed_retry
                .run("embed-document", || self.embeddings.embed(&chunks))
                .await
                .map_err(anyhow::Error::new)?;
            if embeddings.len() != chunks.len() {
                bail!(
                    "embedding batch returned {} vectors for {} chunks",
                    embeddings.len(),
                    chunks.len()
                );
            }

            let rows: Vec<NewChunk> = chunks
                .iter()
                .zip(embeddings)
                .map(|(content, embedding)| NewChunk {
                    document_id: event.document_id.clone(),
                    user_id: event.user_id.clone(),
                    content: content.clone(),
                    embedding,
                })
                .collect();
            self.fetch_retry
                .run("insert-chunks", || self.db.insert_chunks(&rows))
                .await
                .map_err(anyhow::Error::new)?;
        }

        self.db
            .set_document_status(&event.document_id, DocumentStatus::Completed)
            .await
            .context("mark document completed")?;
        Ok(chunks.len())
    }
}

#[async_trait]
impl StageHandler for EmbeddingHandler {
    async fn handle(&self, entry: &StreamEntry) -> Result<(), HandlerError> {
        let event = DocumentEvent::from_fields(&entry.fields).map_err(HandlerError::terminal)?;

        match self.process(&event).await {
            Ok(chunks) => {
                info!(
                    document_id = %event.document_id,
                    user_id = %event.user_id,
                    chunks,
                    "document embedded"
                );
                Ok(())
            }
            Err(err) => {
                warn!(document_id = %event.document_id, error = %err, "document processing failed");
                if let Err(status_err) = self
                    .db
                    .set_document_status(&event.document_id, DocumentStatus::Failed)
                    .await
                {
                    error!(
                        document_id = %event.document_id,
                        error = %status_err,
                        "could not mark document failed"
                    );
                }
                Err(HandlerError::terminal(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use bytes::Bytes;

    use vox_db::{Database, MemoryDatabase, NewDocument};
    use vox_models::{EmbeddingModel, ModelError};
    use vox_storage::MemoryBlobStore;

    struct CountingEmbedder {
        calls: AtomicU32,
        fail_with: Option<u16>,
    }

    impl CountingEmbedder {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_with: None,
            })
        }

        fn rate_limited() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_with: Some(429),
            })
        }
    }

    #[async_trait]
    impl EmbeddingModel for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.fail_with {
                return Err(ModelError::Api {
                    status,
                    message: "rate limited".into(),
                });
            }
            Ok(texts.iter().map(|_| vec![0.5, 0.5, 0.0]).collect())
        }
    }

    struct Fixture {
        db: MemoryDatabase,
        blob: MemoryBlobStore,
        embedder: Arc<CountingEmbedder>,
        handler: EmbeddingHandler,
    }

    fn fixture(embedder: Arc<CountingEmbedder>) -> Fixture {
        let db = MemoryDatabase::new();
        let blob = MemoryBlobStore::new();
        let mut handler = EmbeddingHandler::new(
            Arc::new(db.clone()),
            Arc::new(blob.clone()),
            embedder.clone(),
        );
        handler.fetch_retry = fast(4);
        handler.embed_retry = fast(5);
        Fixture {
            db,
            blob,
            embedder,
            handler,
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base: std::time::Duration::from_millis(1),
            cap: std::time::Duration::from_millis(2),
        }
    }

    async fn seed_document(db: &MemoryDatabase, storage_path: &str) -> String {
        db.create_document(&NewDocument {
            user_id: "u1".into(),
            agent_id: "a1".into(),
            file_name: "faq.txt".into(),
            storage_path: storage_path.into(),
        })
        .await
        .unwrap()
        .id
    }

    fn event_fields(document_id: &str, storage_path: &str, text: &str) -> BTreeMap<String, String> {
        DocumentEvent {
            document_id: document_id.into(),
            user_id: "u1".into(),
            storage_path: storage_path.into(),
            text: text.into(),
        }
        .to_fields()
    }

    #[tokio::test]
    async fn text_document_completes_with_all_chunks_stored() {
        let embedder = CountingEmbedder::ok();
        let fx = fixture(embedder);
        let doc_id = seed_document(&fx.db, "u1/faq.txt").await;
        fx.blob
            .put("u1/faq.txt", Bytes::from("our refund window is 30 days"))
            .await
            .unwrap();

        let entry = StreamEntry::new("1-0", event_fields(&doc_id, "u1/faq.txt", ""));
        fx.handler.handle(&entry).await.unwrap();

        let expected_chunks = chunk::chunk_text("our refund window is 30 days").unwrap();
        let stored = fx.db.chunks_for_document(&doc_id).await;
        assert_eq!(stored.len(), expected_chunks.len());
        assert_eq!(stored[0].content, expected_chunks[0]);
        assert_eq!(stored[0].embedding, vec![0.5, 0.5, 0.0]);
        assert_eq!(
            fx.db.document(&doc_id).await.unwrap().status,
            DocumentStatus::Completed
        );
        assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inline_text_skips_the_blob_store() {
        let fx = fixture(CountingEmbedder::ok());
        let doc_id = seed_document(&fx.db, "").await;

        let entry = StreamEntry::new("1-0", event_fields(&doc_id, "", "texto en línea"));
        fx.handler.handle(&entry).await.unwrap();

        assert_eq!(
            fx.db.document(&doc_id).await.unwrap().status,
            DocumentStatus::Completed
        );
        assert_eq!(fx.db.chunks_for_document(&doc_id).await.len(), 1);
    }

    #[tokio::test]
    async fn empty_document_completes_with_zero_chunks() {
        let fx = fixture(CountingEmbedder::ok());
        let doc_id = seed_document(&fx.db, "u1/empty.txt").await;
        fx.blob.put("u1/empty.txt", Bytes::new()).await.unwrap();

        let entry = StreamEntry::new("1-0", event_fields(&doc_id, "u1/empty.txt", ""));
        fx.handler.handle(&entry).await.unwrap();

        assert!(fx.db.chunks_for_document(&doc_id).await.is_empty());
        assert_eq!(
            fx.db.document(&doc_id).await.unwrap().status,
            DocumentStatus::Completed
        );
        assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_file_type_fails_terminally() {
        let fx = fixture(CountingEmbedder::ok());
        let doc_id = seed_document(&fx.db, "u1/sheet.xlsx").await;
        fx.blob
            .put("u1/sheet.xlsx", Bytes::from_static(b"PK\x03\x04"))
            .await
            .unwrap();

        let entry = StreamEntry::new("1-0", event_fields(&doc_id, "u1/sheet.xlsx", ""));
        let err = fx.handler.handle(&entry).await.unwrap_err();
        assert!(matches!(err, HandlerError::Terminal(_)));
        assert_eq!(
            fx.db.document(&doc_id).await.unwrap().status,
            DocumentStatus::Failed
        );
        assert!(fx.db.chunks_for_document(&doc_id).await.is_empty());
    }

    #[tokio::test]
    async fn rate_limited_embeddings_use_the_patient_schedule_then_fail() {
        let embedder = CountingEmbedder::rate_limited();
        let fx = fixture(embedder);
        let doc_id = seed_document(&fx.db, "").await;

        let entry = StreamEntry::new("1-0", event_fields(&doc_id, "", "algo de texto"));
        let err = fx.handler.handle(&entry).await.unwrap_err();
        assert!(matches!(err, HandlerError::Terminal(_)));
        assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), 5);
        assert_eq!(
            fx.db.document(&doc_id).await.unwrap().status,
            DocumentStatus::Failed
        );
    }

    #[tokio::test]
    async fn oversize_document_is_rejected_before_download() {
        let fx = fixture(CountingEmbedder::ok());
        let doc_id = seed_document(&fx.db, "u1/big.txt").await;
        fx.blob
            .put(
                "u1/big.txt",
                Bytes::from(vec![b'a'; (MAX_DOCUMENT_BYTES + 1) as usize]),
            )
            .await
            .unwrap();

        let entry = StreamEntry::new("1-0", event_fields(&doc_id, "u1/big.txt", ""));
        let err = fx.handler.handle(&entry).await.unwrap_err();
        assert!(matches!(err, HandlerError::Terminal(_)));
        assert_eq!(
            fx.db.document(&doc_id).await.unwrap().status,
            DocumentStatus::Failed
        );
    }

    #[tokio::test]
    async fn event_without_document_id_is_terminal() {
        let fx = fixture(CountingEmbedder::ok());
        let entry = StreamEntry::new("1-0", BTreeMap::new());
        let err = fx.handler.handle(&entry).await.unwrap_err();
        assert!(matches!(err, HandlerError::Terminal(_)));
    }
}
