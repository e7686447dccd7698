//! The consumer-group loop shared by every worker.
//!
//! A stage is a [`StageHandler`] plugged into a [`StageRunner`]. The runner
//! owns the contract that keeps the pipeline lossless: an entry is either
//! processed and acknowledged, or quarantined to the dead-letter sink and
//! *then* acknowledged, so the input stream never redelivers a poison
//! message forever.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{Healthbeat, SharedStreamStore, StreamEntry, StreamStore};
use vox_core::streams::consumer_name;
use vox_retry::{RetryPolicy, Retryable};

/// Stage handler outcome. `Transient` asks the runner to retry under its
/// policy; `Terminal` sends the entry to the dead-letter sink immediately.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("transient failure: {0}")]
    Transient(anyhow::Error),
    #[error("terminal failure: {0}")]
    Terminal(anyhow::Error),
}

impl HandlerError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self::Transient(err.into())
    }

    pub fn terminal(err: impl Into<anyhow::Error>) -> Self {
        Self::Terminal(err.into())
    }

    /// The underlying error message, without the classification prefix.
    pub fn details(&self) -> String {
        match self {
            Self::Transient(err) | Self::Terminal(err) => err.to_string(),
        }
    }
}

impl Retryable for HandlerError {
    fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(&self, entry: &StreamEntry) -> Result<(), HandlerError>;
}

/// Destination for entries that exhausted their retry budget.
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn quarantine(&self, entry: &StreamEntry, details: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct StageConfig {
    pub service: String,
    pub stream: String,
    pub group: String,
    /// Entries fetched per block-read.
    pub batch: usize,
    /// How long a read blocks before returning an empty batch.
    pub block: Duration,
    /// Pause after a broker error before polling again.
    pub recovery: Duration,
}

impl StageConfig {
    pub fn new(
        service: impl Into<String>,
        stream: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            stream: stream.into(),
            group: group.into(),
            batch: 1,
            block: Duration::from_secs(5),
            recovery: Duration::from_secs(5),
        }
    }

    pub fn batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }
}

pub struct StageRunner {
    store: SharedStreamStore,
    handler: Arc<dyn StageHandler>,
    dlq: Arc<dyn FailureSink>,
    retry: RetryPolicy,
    healthbeat: Healthbeat,
    config: StageConfig,
}

impl StageRunner {
    pub fn new(
        store: SharedStreamStore,
        handler: Arc<dyn StageHandler>,
        dlq: Arc<dyn FailureSink>,
        retry: RetryPolicy,
        healthbeat: Healthbeat,
        config: StageConfig,
    ) -> Self {
        Self {
            store,
            handler,
            dlq,
            retry,
            healthbeat,
            config,
        }
    }

    /// Runs until `shutdown` flips to `true`. The in-flight entry is always
    /// finished; anything still pending is reclaimed by another consumer.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.store
            .ensure_group(&self.config.stream, &self.config.group)
            .await
            .with_context(|| {
                format!(
                    "create consumer group '{}' on '{}'",
                    self.config.group, self.config.stream
                )
            })?;

        let consumer = consumer_name(&self.config.service);
        info!(
            service = %self.config.service,
            stream = %self.config.stream,
            group = %self.config.group,
            consumer = %consumer,
            "stage runner listening"
        );

        while !*shutdown.borrow() {
            self.healthbeat.touch().await;

            let read = tokio::select! {
                read = self.store.read_group(
                    &self.config.stream,
                    &self.config.group,
                    &consumer,
                    self.config.batch,
                    self.config.block,
                ) => read,
                _ = shutdown.changed() => continue,
            };

            let entries = match read {
                Ok(entries) => entries,
                Err(err) => {
                    error!(service = %self.config.service, error = %err, "stream read failed");
                    tokio::time::sleep(self.config.recovery).await;
                    continue;
                }
            };

            for entry in entries {
                self.process(&entry).await;
            }
        }

        info!(service = %self.config.service, "stage runner stopped");
        Ok(())
    }

    async fn process(&self, entry: &StreamEntry) {
        let outcome = self
            .retry
            .run(&self.config.service, || self.handler.handle(entry))
            .await;

        match outcome {
            Ok(()) => self.ack(entry).await,
            Err(err) => {
                warn!(
                    service = %self.config.service,
                    entry_id = %entry.id,
                    error = %err,
                    "entry failed terminally, quarantining"
                );
                match self.dlq.quarantine(entry, &err.details()).await {
                    // Quarantined first, acked second: the entry is never
                    // both lost and acknowledged.
                    Ok(()) => self.ack(entry).await,
                    Err(dlq_err) => {
                        error!(
                            service = %self.config.service,
                            entry_id = %entry.id,
                            error = %dlq_err,
                            "failed to quarantine entry; leaving unacked for redelivery"
                        );
                    }
                }
            }
        }
    }

    async fn ack(&self, entry: &StreamEntry) {
        if let Err(err) = self
            .store
            .ack(&self.config.stream, &self.config.group, &entry.id)
            .await
        {
            error!(
                service = %self.config.service,
                entry_id = %entry.id,
                error = %err,
                "ack failed; entry may be redelivered"
            );
        }
    }
}
