//! Embedding worker with the admission gate
//!
//! Wraps one provider with micro-batching and bounded admission. The gate
//! is the system's only explicit load-shedding mechanism: at capacity the
//! worker rejects immediately with a retry-after hint instead of queuing
//! unbounded work in memory. The counter is per worker instance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use docuvec_config::EmbeddingConfig;
use tokio::sync::Semaphore;

use crate::embedding::traits::EmbeddingProvider;
use crate::error::{EmbeddingError, EmbeddingResult};

/// Result of one admitted embed call. `warnings` carries non-fatal
/// diagnostics such as inputs the service will truncate.
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub dim: usize,
    pub warnings: Vec<String>,
    pub took: Duration,
}

pub struct EmbeddingWorker {
    provider: Arc<dyn EmbeddingProvider>,
    max_seq: usize,
    inflight: Semaphore,
    max_inflight: usize,
    batch_size: usize,
    batch_latency: Duration,
    retry_after: Duration,
}

impl EmbeddingWorker {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        max_seq: usize,
        config: &EmbeddingConfig,
    ) -> Self {
        Self {
            provider,
            max_seq,
            inflight: Semaphore::new(config.max_inflight),
            max_inflight: config.max_inflight,
            batch_size: config.batch_size.max(1),
            batch_latency: Duration::from_millis(config.batch_latency_ms),
            retry_after: Duration::from_millis(config.retry_after_ms),
        }
    }

    /// Embed all texts, micro-batched. Rejects instantly with
    /// `Overloaded` when `max_inflight` calls are already admitted.
    pub async fn embed(&self, texts: &[String]) -> EmbeddingResult<EmbeddingBatch> {
        let Ok(_permit) = self.inflight.try_acquire() else {
            tracing::warn!(
                model = %self.provider.model_name(),
                max_inflight = self.max_inflight,
                "Admission gate at capacity, rejecting"
            );
            return Err(EmbeddingError::Overloaded {
                retry_after: self.retry_after,
            });
        };

        // Whitespace tokens undercount subword tokens, so anything this
        // flags is certain to be cut short by the inference service.
        let mut warnings = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let tokens = text.split_whitespace().count();
            if tokens > self.max_seq {
                warnings.push(format!(
                    "text {i}: {tokens} tokens exceeds max_seq {} for {}, service will truncate",
                    self.max_seq,
                    self.provider.model_name()
                ));
            }
        }

        let start = Instant::now();
        let mut vectors = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            if i > 0 {
                // Coalescing delay between micro-batches
                tokio::time::sleep(self.batch_latency).await;
            }
            let mut out = self.provider.embed(batch).await?;
            if out.len() != batch.len() {
                return Err(EmbeddingError::Embedding(format!(
                    "{} returned {} vectors for a batch of {}",
                    self.provider.model_name(),
                    out.len(),
                    batch.len()
                )));
            }
            vectors.append(&mut out);
        }

        Ok(EmbeddingBatch {
            vectors,
            dim: self.provider.dimension(),
            warnings,
            took: start.elapsed(),
        })
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Admitted calls right now (for tests and metrics)
    pub fn inflight(&self) -> usize {
        self.max_inflight - self.inflight.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::mock::MockProvider;

    fn config(max_inflight: usize, batch_size: usize) -> EmbeddingConfig {
        let mut config = EmbeddingConfig::from_env();
        config.max_inflight = max_inflight;
        config.batch_size = batch_size;
        config.batch_latency_ms = 1;
        config.retry_after_ms = 250;
        config
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {i}")).collect()
    }

    #[tokio::test]
    async fn micro_batching_preserves_order() {
        let provider = Arc::new(MockProvider::new("mock", 8));
        let worker = EmbeddingWorker::new(provider.clone(), 512, &config(4, 3));
        let input = texts(10);
        let batch = worker.embed(&input).await.unwrap();
        assert_eq!(batch.vectors.len(), 10);
        assert_eq!(batch.dim, 8);
        assert!(batch.warnings.is_empty());
        for (text, vector) in input.iter().zip(&batch.vectors) {
            assert_eq!(vector, &provider.vector_for(text));
        }
    }

    #[tokio::test]
    async fn over_length_text_is_flagged_not_rejected() {
        let provider = Arc::new(MockProvider::new("tiny-window", 8));
        let worker = EmbeddingWorker::new(provider, 4, &config(4, 32));
        let input = vec![
            "short enough".to_string(),
            "one two three four five six seven".to_string(),
        ];
        let batch = worker.embed(&input).await.unwrap();
        assert_eq!(batch.vectors.len(), 2);
        assert_eq!(batch.warnings.len(), 1);
        assert!(batch.warnings[0].contains("text 1"));
        assert!(batch.warnings[0].contains("truncate"));
    }

    #[tokio::test]
    async fn at_capacity_rejects_with_retry_hint() {
        let provider = Arc::new(MockProvider::new("slow", 4).with_delay(Duration::from_millis(200)));
        let worker = Arc::new(EmbeddingWorker::new(provider, 512, &config(2, 32)));

        let w1 = Arc::clone(&worker);
        let h1 = tokio::spawn(async move { w1.embed(&texts(1)).await });
        let w2 = Arc::clone(&worker);
        let h2 = tokio::spawn(async move { w2.embed(&texts(1)).await });
        // Let both admitted calls reach the provider delay
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.inflight(), 2);

        let rejected = worker.embed(&texts(1)).await;
        match rejected {
            Err(EmbeddingError::Overloaded { retry_after }) => {
                assert_eq!(retry_after, Duration::from_millis(250));
            }
            other => panic!("expected overload rejection, got {other:?}"),
        }

        assert!(h1.await.unwrap().is_ok());
        assert!(h2.await.unwrap().is_ok());
        // Permits are released once admitted work completes
        assert_eq!(worker.inflight(), 0);
        assert!(worker.embed(&texts(1)).await.is_ok());
    }
}
