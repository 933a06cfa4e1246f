//! HTTP embedding provider for TEI-style inference services
//!
//! POSTs `{"inputs": [...]}` to `{endpoint}/embed` and expects a JSON
//! array of float vectors back, one per input, in order.

use async_trait::async_trait;
use docuvec_config::ModelSpec;
use serde::Serialize;

use crate::embedding::traits::EmbeddingProvider;
use crate::error::{EmbeddingError, EmbeddingResult};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    model_name: String,
    dim: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(spec: &ModelSpec) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/embed", spec.endpoint.trim_end_matches('/')),
            model_name: spec.id.clone(),
            dim: spec.dim,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    #[tracing::instrument(skip(self, texts), fields(model = %self.model_name, text_count = texts.len()))]
    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest { inputs: texts })
            .send()
            .await
            .map_err(|e| EmbeddingError::Network(format!("{}: {e}", self.model_name)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Embedding(format!(
                "{} returned {status}: {body}",
                self.model_name
            )));
        }

        let vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Embedding(format!("{}: bad response: {e}", self.model_name)))?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Embedding(format!(
                "{} returned {} vectors for {} texts",
                self.model_name,
                vectors.len(),
                texts.len()
            )));
        }
        for vector in &vectors {
            if vector.len() != self.dim {
                return Err(EmbeddingError::Embedding(format!(
                    "{} returned a {}-dim vector, expected {}",
                    self.model_name,
                    vector.len(),
                    self.dim
                )));
            }
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
