//! Process-wide catalog of embedding models
//!
//! Read-mostly: the model set is fixed at startup from configuration, and
//! the only runtime mutation is the per-model health flag. Health updates
//! are last-writer-wins atomics - staleness is acceptable for a liveness
//! signal, so no lock is taken on the read path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use docuvec_config::{EmbeddingConfig, ModelSpec, Profile};

struct ModelEntry {
    spec: ModelSpec,
    healthy: AtomicBool,
}

pub struct ModelRegistry {
    entries: HashMap<String, ModelEntry>,
    defaults: HashMap<Profile, Vec<String>>,
}

impl ModelRegistry {
    /// Build the registry from configuration. All models start healthy;
    /// a liveness prober (or dispatch failures) flip them at runtime.
    pub fn from_config(config: &EmbeddingConfig) -> Arc<Self> {
        let entries = config
            .models
            .iter()
            .map(|spec| {
                (
                    spec.alias.clone(),
                    ModelEntry {
                        spec: spec.clone(),
                        healthy: AtomicBool::new(true),
                    },
                )
            })
            .collect();
        Arc::new(Self {
            entries,
            defaults: config.default_models.clone(),
        })
    }

    pub fn list_models(&self) -> Vec<&ModelSpec> {
        self.entries.values().map(|e| &e.spec).collect()
    }

    pub fn get_model(&self, alias: &str) -> Option<&ModelSpec> {
        self.entries.get(alias).map(|e| &e.spec)
    }

    /// Default target aliases for a profile. Empty when the profile has
    /// no configured defaults.
    pub fn default_models(&self, profile: Profile) -> Vec<String> {
        self.defaults.get(&profile).cloned().unwrap_or_default()
    }

    /// Unknown aliases read as unhealthy.
    pub fn is_healthy(&self, alias: &str) -> bool {
        self.entries
            .get(alias)
            .is_some_and(|e| e.healthy.load(Ordering::Relaxed))
    }

    /// Last-writer-wins health update. Returns false for unknown aliases.
    pub fn set_health(&self, alias: &str, healthy: bool) -> bool {
        match self.entries.get(alias) {
            Some(entry) => {
                entry.healthy.store(healthy, Ordering::Relaxed);
                tracing::info!(model = %alias, healthy, "Model health updated");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EmbeddingConfig {
        let mut config = EmbeddingConfig::from_env();
        config.models = vec![
            ModelSpec::with_default_queues("minilm", "minilm-l6", 384, 512, "http://localhost:8080"),
            ModelSpec::with_default_queues("bge-large", "bge-large-en", 1024, 512, "http://localhost:8081"),
        ];
        config.default_models = HashMap::from([
            (Profile::Rt, vec!["minilm".to_string()]),
            (
                Profile::Bulk,
                vec!["minilm".to_string(), "bge-large".to_string()],
            ),
        ]);
        config
    }

    #[test]
    fn models_start_healthy() {
        let registry = ModelRegistry::from_config(&test_config());
        assert!(registry.is_healthy("minilm"));
        assert!(registry.is_healthy("bge-large"));
        assert!(!registry.is_healthy("unknown"));
    }

    #[test]
    fn health_flips_without_affecting_specs() {
        let registry = ModelRegistry::from_config(&test_config());
        assert!(registry.set_health("minilm", false));
        assert!(!registry.is_healthy("minilm"));
        assert_eq!(registry.get_model("minilm").map(|s| s.dim), Some(384));
        assert!(!registry.set_health("unknown", false));
    }

    #[test]
    fn defaults_differ_per_profile() {
        let registry = ModelRegistry::from_config(&test_config());
        assert_eq!(registry.default_models(Profile::Rt), vec!["minilm"]);
        assert_eq!(
            registry.default_models(Profile::Bulk),
            vec!["minilm", "bge-large"]
        );
    }
}
