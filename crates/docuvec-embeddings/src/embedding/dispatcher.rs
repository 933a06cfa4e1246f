//! Embedding dispatcher: one logical request fanned out to N models
//!
//! Resolves target models (explicit override or per-profile registry
//! defaults), filters to healthy ones, submits to each model's profile
//! queue, then awaits every reply under a profile-dependent timeout.
//! A model that errors or times out contributes an entry to `errors`
//! instead of failing the sibling results.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use docuvec_config::{EmbeddingConfig, Profile};
use futures::future::join_all;
use uuid::Uuid;

use crate::embedding::pool::EmbeddingPool;
use crate::error::EmbeddingError;
use crate::registry::ModelRegistry;

#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub request_id: Uuid,
    pub tenant_id: Uuid,
    pub texts: Vec<String>,
    pub profile: Profile,
    /// Explicit target aliases; `None` uses the registry defaults for
    /// the profile
    pub models: Option<Vec<String>>,
}

impl EmbeddingRequest {
    pub fn new(tenant_id: Uuid, texts: Vec<String>, profile: Profile) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            tenant_id,
            texts,
            profile,
            models: None,
        }
    }

    #[must_use]
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = Some(models);
        self
    }
}

/// Successful output of one model for one request. `vectors[i]`
/// corresponds to `request.texts[i]`; `warnings` carries the worker's
/// non-fatal diagnostics (truncated inputs).
#[derive(Debug, Clone)]
pub struct ModelResult {
    pub model: String,
    pub dim: usize,
    pub vectors: Vec<Vec<f32>>,
    pub warnings: Vec<String>,
    pub took: Duration,
}

#[derive(Debug, Clone)]
pub struct ModelError {
    pub model: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingResponse {
    pub request_id: Uuid,
    pub results: Vec<ModelResult>,
    pub errors: Vec<ModelError>,
}

impl EmbeddingResponse {
    /// No model produced vectors. Callers treat this as retryable at
    /// the pipeline-stage level.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Statistics about request distribution
#[derive(Debug, Clone, Default)]
pub struct DispatcherStats {
    pub total_requests: u64,
    pub partial_failures: u64,
    pub empty_responses: u64,
}

pub struct EmbeddingDispatcher {
    registry: Arc<ModelRegistry>,
    pool: EmbeddingPool,
    rt_wait: Duration,
    bulk_wait: Duration,
    total_requests: AtomicU64,
    partial_failures: AtomicU64,
    empty_responses: AtomicU64,
}

impl EmbeddingDispatcher {
    pub fn new(registry: Arc<ModelRegistry>, pool: EmbeddingPool, config: &EmbeddingConfig) -> Self {
        Self {
            registry,
            pool,
            rt_wait: config.wait_timeout(Profile::Rt),
            bulk_wait: config.wait_timeout(Profile::Bulk),
            total_requests: AtomicU64::new(0),
            partial_failures: AtomicU64::new(0),
            empty_responses: AtomicU64::new(0),
        }
    }

    const fn wait_for(&self, profile: Profile) -> Duration {
        match profile {
            Profile::Rt => self.rt_wait,
            Profile::Bulk => self.bulk_wait,
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            partial_failures: self.partial_failures.load(Ordering::Relaxed),
            empty_responses: self.empty_responses.load(Ordering::Relaxed),
        }
    }

    #[tracing::instrument(skip(self, request), fields(request_id = %request.request_id, tenant_id = %request.tenant_id, profile = %request.profile, text_count = request.texts.len()))]
    pub async fn dispatch(&self, request: EmbeddingRequest) -> EmbeddingResponse {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let targets = request
            .models
            .clone()
            .unwrap_or_else(|| self.registry.default_models(request.profile));

        let mut response = EmbeddingResponse {
            request_id: request.request_id,
            ..Default::default()
        };
        let mut pending = Vec::new();

        for alias in targets {
            if self.registry.get_model(&alias).is_none() {
                response.errors.push(ModelError {
                    model: alias.clone(),
                    message: "not registered".to_string(),
                    retryable: false,
                });
                continue;
            }
            if !self.registry.is_healthy(&alias) {
                response.errors.push(ModelError {
                    model: alias.clone(),
                    message: "unhealthy".to_string(),
                    retryable: true,
                });
                continue;
            }
            match self.pool.submit(&alias, request.profile, request.texts.clone()) {
                Ok(reply) => pending.push((alias, reply)),
                Err(e) => response.errors.push(ModelError {
                    model: alias.clone(),
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                }),
            }
        }

        if pending.is_empty() {
            tracing::warn!(
                request_id = %request.request_id,
                "No healthy target model for embedding request"
            );
            response.errors.push(ModelError {
                model: String::new(),
                message: "no healthy target model".to_string(),
                retryable: true,
            });
            self.empty_responses.fetch_add(1, Ordering::Relaxed);
            return response;
        }

        let wait = self.wait_for(request.profile);
        let expected = request.texts.len();
        let waits = pending.into_iter().map(|(alias, reply)| async move {
            (alias, tokio::time::timeout(wait, reply).await)
        });

        for (alias, outcome) in join_all(waits).await {
            match outcome {
                Ok(Ok(Ok(batch))) => {
                    if batch.vectors.len() == expected {
                        response.results.push(ModelResult {
                            model: alias,
                            dim: batch.dim,
                            vectors: batch.vectors,
                            warnings: batch.warnings,
                            took: batch.took,
                        });
                    } else {
                        response.errors.push(ModelError {
                            model: alias,
                            message: format!(
                                "returned {} vectors for {expected} texts",
                                batch.vectors.len()
                            ),
                            retryable: false,
                        });
                    }
                }
                Ok(Ok(Err(e))) => response.errors.push(ModelError {
                    model: alias,
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                }),
                Ok(Err(_)) => response.errors.push(ModelError {
                    model: alias,
                    message: "worker dropped reply".to_string(),
                    retryable: true,
                }),
                Err(_) => {
                    let e = EmbeddingError::Timeout {
                        model: alias.clone(),
                        waited: wait,
                    };
                    response.errors.push(ModelError {
                        model: alias,
                        message: e.to_string(),
                        retryable: true,
                    });
                }
            }
        }

        if !response.errors.is_empty() && !response.results.is_empty() {
            self.partial_failures.fetch_add(1, Ordering::Relaxed);
        }
        if response.is_empty() {
            self.empty_responses.fetch_add(1, Ordering::Relaxed);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::mock::MockProvider;
    use crate::embedding::traits::EmbeddingProvider;
    use docuvec_config::ModelSpec;
    use std::collections::HashMap;

    fn two_model_config() -> EmbeddingConfig {
        let mut config = EmbeddingConfig::from_env();
        config.models = vec![
            ModelSpec::with_default_queues("minilm", "minilm-l6", 8, 512, "http://localhost:8080"),
            ModelSpec::with_default_queues("bge", "bge-large-en", 16, 512, "http://localhost:8081"),
        ];
        config.default_models = HashMap::from([
            (Profile::Rt, vec!["minilm".to_string()]),
            (Profile::Bulk, vec!["minilm".to_string(), "bge".to_string()]),
        ]);
        config
    }

    fn dispatcher(config: &EmbeddingConfig) -> (Arc<ModelRegistry>, EmbeddingDispatcher) {
        let registry = ModelRegistry::from_config(config);
        let providers: HashMap<String, Arc<dyn EmbeddingProvider>> = HashMap::from([
            (
                "minilm".to_string(),
                Arc::new(MockProvider::new("minilm-l6", 8)) as Arc<dyn EmbeddingProvider>,
            ),
            (
                "bge".to_string(),
                Arc::new(MockProvider::new("bge-large-en", 16)) as Arc<dyn EmbeddingProvider>,
            ),
        ]);
        let pool = EmbeddingPool::new(&registry, providers, config);
        let dispatcher = EmbeddingDispatcher::new(Arc::clone(&registry), pool, config);
        (registry, dispatcher)
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("chunk {i}")).collect()
    }

    fn tenant() -> Uuid {
        Uuid::new_v4()
    }

    #[tokio::test]
    async fn bulk_profile_fans_out_to_all_defaults() {
        let config = two_model_config();
        let (_registry, dispatcher) = dispatcher(&config);
        let response = dispatcher
            .dispatch(EmbeddingRequest::new(tenant(), texts(3), Profile::Bulk))
            .await;
        assert_eq!(response.results.len(), 2);
        assert!(response.errors.is_empty());
        for result in &response.results {
            assert_eq!(result.vectors.len(), 3);
        }
        let dims: Vec<usize> = response.results.iter().map(|r| r.dim).collect();
        assert!(dims.contains(&8) && dims.contains(&16));
    }

    #[tokio::test]
    async fn vectors_align_positionally_with_texts() {
        let config = two_model_config();
        let (_registry, dispatcher) = dispatcher(&config);
        let input = texts(5);
        let response = dispatcher
            .dispatch(EmbeddingRequest::new(tenant(), input.clone(), Profile::Rt))
            .await;
        assert_eq!(response.results.len(), 1);
        let reference = MockProvider::new("minilm-l6", 8);
        for (i, text) in input.iter().enumerate() {
            assert_eq!(response.results[0].vectors[i], reference.vector_for(text));
        }
    }

    #[tokio::test]
    async fn unhealthy_model_becomes_partial_failure() {
        let config = two_model_config();
        let (registry, dispatcher) = dispatcher(&config);
        registry.set_health("bge", false);
        let response = dispatcher
            .dispatch(EmbeddingRequest::new(tenant(), texts(2), Profile::Bulk))
            .await;
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].model, "minilm");
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].model, "bge");
        assert!(response.errors[0].retryable);
        assert_eq!(dispatcher.stats().partial_failures, 1);
    }

    #[tokio::test]
    async fn zero_healthy_models_yields_empty_retryable_response() {
        let config = two_model_config();
        let (registry, dispatcher) = dispatcher(&config);
        registry.set_health("minilm", false);
        registry.set_health("bge", false);
        let response = dispatcher
            .dispatch(EmbeddingRequest::new(tenant(), texts(1), Profile::Bulk))
            .await;
        assert!(response.is_empty());
        assert!(response.errors.iter().all(|e| e.retryable));
        assert_eq!(dispatcher.stats().empty_responses, 1);
    }

    #[test]
    fn request_keeps_its_tenant() {
        let tenant_id = tenant();
        let request = EmbeddingRequest::new(tenant_id, texts(1), Profile::Rt);
        assert_eq!(request.tenant_id, tenant_id);
    }

    #[tokio::test]
    async fn truncation_warnings_ride_the_model_result() {
        let mut config = two_model_config();
        // Window of 2 tokens so the second text overruns it
        config.models[0] =
            ModelSpec::with_default_queues("minilm", "minilm-l6", 8, 2, "http://localhost:8080");
        let (_registry, dispatcher) = dispatcher(&config);
        let input = vec![
            "fits".to_string(),
            "this one runs well past the window".to_string(),
        ];
        let response = dispatcher
            .dispatch(EmbeddingRequest::new(tenant(), input, Profile::Rt))
            .await;
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].vectors.len(), 2);
        assert_eq!(response.results[0].warnings.len(), 1);
        assert!(response.results[0].warnings[0].contains("truncate"));
    }

    #[tokio::test]
    async fn explicit_model_override_skips_defaults() {
        let config = two_model_config();
        let (_registry, dispatcher) = dispatcher(&config);
        let response = dispatcher
            .dispatch(
                EmbeddingRequest::new(tenant(), texts(1), Profile::Rt)
                    .with_models(vec!["bge".to_string(), "nope".to_string()]),
            )
            .await;
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].model, "bge");
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].model, "nope");
        assert!(!response.errors[0].retryable);
    }
}
