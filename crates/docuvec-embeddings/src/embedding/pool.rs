//! Per-model per-profile task queues
//!
//! Architecture:
//! - Dispatcher → per-(model, profile) queue → model worker → reply channel
//! - Each job carries a oneshot reply sender, so the dispatcher suspends a
//!   lightweight task instead of occupying a worker slot while it waits
//! - Both profiles of one model share that model's admission gate
//!
//! Queues are tokio mpsc channels standing in for the broker topics a
//! multi-process deployment would bind per `ModelSpec::queue_for`.

use std::collections::HashMap;
use std::sync::Arc;

use docuvec_config::{EmbeddingConfig, Profile};
use tokio::sync::{mpsc, oneshot};

use crate::embedding::http::HttpEmbeddingProvider;
use crate::embedding::traits::EmbeddingProvider;
use crate::embedding::worker::{EmbeddingBatch, EmbeddingWorker};
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::registry::ModelRegistry;

/// One embedding job travelling through a model queue
struct ModelJob {
    texts: Vec<String>,
    reply: oneshot::Sender<EmbeddingResult<EmbeddingBatch>>,
}

pub struct EmbeddingPool {
    queues: HashMap<(String, Profile), mpsc::UnboundedSender<ModelJob>>,
}

impl EmbeddingPool {
    /// Build a pool with explicit providers (tests inject mocks here).
    /// Models without a provider are skipped; dispatch to them reports
    /// `ModelUnavailable`.
    pub fn new(
        registry: &ModelRegistry,
        providers: HashMap<String, Arc<dyn EmbeddingProvider>>,
        config: &EmbeddingConfig,
    ) -> Self {
        let mut queues = HashMap::new();
        for spec in registry.list_models() {
            let Some(provider) = providers.get(&spec.alias) else {
                tracing::warn!(model = %spec.alias, "No provider for model, skipping queues");
                continue;
            };
            let worker = Arc::new(EmbeddingWorker::new(
                Arc::clone(provider),
                spec.max_seq,
                config,
            ));
            for profile in Profile::all() {
                let (tx, rx) = mpsc::unbounded_channel();
                queues.insert((spec.alias.clone(), *profile), tx);
                let queue_name = spec
                    .queue_for(*profile)
                    .unwrap_or("embed.unbound")
                    .to_string();
                tokio::spawn(model_queue_loop(queue_name, Arc::clone(&worker), rx));
            }
        }
        Self { queues }
    }

    /// Production wiring: one HTTP provider per registered model.
    pub fn with_http_providers(registry: &ModelRegistry, config: &EmbeddingConfig) -> Self {
        let providers: HashMap<String, Arc<dyn EmbeddingProvider>> = registry
            .list_models()
            .into_iter()
            .map(|spec| {
                (
                    spec.alias.clone(),
                    Arc::new(HttpEmbeddingProvider::new(spec)) as Arc<dyn EmbeddingProvider>,
                )
            })
            .collect();
        Self::new(registry, providers, config)
    }

    /// Submit texts to one model's profile queue. Returns the reply
    /// channel to await; the send itself never blocks.
    pub fn submit(
        &self,
        alias: &str,
        profile: Profile,
        texts: Vec<String>,
    ) -> EmbeddingResult<oneshot::Receiver<EmbeddingResult<EmbeddingBatch>>> {
        let sender = self
            .queues
            .get(&(alias.to_string(), profile))
            .ok_or_else(|| {
                EmbeddingError::ModelUnavailable(format!("no {profile} queue for '{alias}'"))
            })?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(ModelJob {
                texts,
                reply: reply_tx,
            })
            .map_err(|_| {
                EmbeddingError::ModelUnavailable(format!("'{alias}' {profile} queue closed"))
            })?;
        Ok(reply_rx)
    }
}

/// Queue consumer for one (model, profile) pair. Jobs are handled on
/// their own tasks so a slow batch does not serialize the queue; the
/// worker's admission gate bounds actual concurrency.
async fn model_queue_loop(
    queue_name: String,
    worker: Arc<EmbeddingWorker>,
    mut rx: mpsc::UnboundedReceiver<ModelJob>,
) {
    tracing::debug!(queue = %queue_name, model = %worker.model_name(), "Model queue worker starting");
    while let Some(job) = rx.recv().await {
        let worker = Arc::clone(&worker);
        let queue = queue_name.clone();
        tokio::spawn(async move {
            let result = worker.embed(&job.texts).await;
            if job.reply.send(result).is_err() {
                tracing::warn!(queue = %queue, "Requester dropped reply channel");
            }
        });
    }
    tracing::debug!(queue = %queue_name, "Model queue worker shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::mock::MockProvider;
    use docuvec_config::ModelSpec;

    fn setup() -> (Arc<ModelRegistry>, EmbeddingPool) {
        let mut config = EmbeddingConfig::from_env();
        config.models = vec![ModelSpec::with_default_queues(
            "minilm",
            "minilm-l6",
            8,
            512,
            "http://localhost:8080",
        )];
        let registry = ModelRegistry::from_config(&config);
        let providers: HashMap<String, Arc<dyn EmbeddingProvider>> = HashMap::from([(
            "minilm".to_string(),
            Arc::new(MockProvider::new("minilm-l6", 8)) as Arc<dyn EmbeddingProvider>,
        )]);
        let pool = EmbeddingPool::new(&registry, providers, &config);
        (registry, pool)
    }

    #[tokio::test]
    async fn submit_round_trips_through_the_queue() {
        let (_registry, pool) = setup();
        let rx = pool
            .submit("minilm", Profile::Rt, vec!["hello".to_string()])
            .unwrap();
        let batch = rx.await.unwrap().unwrap();
        assert_eq!(batch.vectors.len(), 1);
        assert_eq!(batch.dim, 8);
    }

    #[tokio::test]
    async fn unknown_model_has_no_queue() {
        let (_registry, pool) = setup();
        let err = pool.submit("missing", Profile::Rt, vec![]).unwrap_err();
        assert!(matches!(err, EmbeddingError::ModelUnavailable(_)));
    }
}
