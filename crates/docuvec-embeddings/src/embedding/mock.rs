//! Deterministic embedding provider for tests
//!
//! Vectors are a pure function of the input text, so assertions about
//! positional correspondence and re-runs are stable.

use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::traits::EmbeddingProvider;
use crate::error::EmbeddingResult;

pub struct MockProvider {
    model_name: String,
    dim: usize,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new(model_name: impl Into<String>, dim: usize) -> Self {
        Self {
            model_name: model_name.into(),
            dim,
            delay: None,
        }
    }

    /// Add an artificial per-call delay (for overload and timeout tests)
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The vector this provider would produce for `text`
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf2_9ce4_8422_2325 ^ (text.len() as u64);
        for byte in text.bytes() {
            state ^= u64::from(byte);
            state = state.wrapping_mul(0x0100_0000_01b3);
        }
        (0..self.dim)
            .map(|i| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(i as u64 + 1_442_695_040_888_963_407);
                ((state >> 40) as f32 / 8_388_608.0) - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vectors_are_deterministic_and_sized() {
        let provider = MockProvider::new("mock", 8);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let a = provider.embed(&texts).await.unwrap();
        let b = provider.embed(&texts).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].len(), 8);
        assert_ne!(a[0], a[1]);
    }
}
