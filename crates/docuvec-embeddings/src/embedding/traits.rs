//! Trait abstraction for embedding providers
//!
//! A provider is the single `embed` capability behind one model: an HTTP
//! inference service in production, a deterministic stub in tests.

use async_trait::async_trait;

use crate::EmbeddingResult;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per input text, in input order.
    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Vector width this provider produces
    fn dimension(&self) -> usize;

    /// Model name for logging and error messages
    fn model_name(&self) -> &str;
}
