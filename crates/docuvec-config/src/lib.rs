//! Centralized configuration management for docuvec
//!
//! This crate provides a unified configuration system that eliminates
//! duplication across the workspace and provides type-safe, validated
//! configuration.
//!
//! Configuration follows a simple hierarchy:
//! 1. Safe defaults (defined as constants)
//! 2. Environment variable overrides
//! 3. Runtime validation

pub mod error;
pub mod profile;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use profile::Profile;

use std::collections::HashMap;
use std::time::Duration;

// =============================================================================
// SAFE DEFAULTS - Work for any environment (dev, staging, prod, test)
// =============================================================================

// Embedding dispatch configuration
const DEFAULT_RT_WAIT_TIMEOUT_MS: u64 = 5_000; // Interactive callers give up fast
const DEFAULT_BULK_WAIT_TIMEOUT_MS: u64 = 60_000; // Ingestion tolerates slow batches

// Embedding worker configuration
const DEFAULT_EMBED_MAX_INFLIGHT: usize = 8; // Admission gate capacity
const DEFAULT_EMBED_BATCH_SIZE: usize = 32; // Texts per micro-batch
const DEFAULT_EMBED_BATCH_LATENCY_MS: u64 = 10; // Coalescing gap between micro-batches
const DEFAULT_EMBED_RETRY_AFTER_MS: u64 = 500; // Hint returned on overload rejection

// Chunking configuration
const DEFAULT_CHUNK_MAX_CHARS: usize = 1_200;
const DEFAULT_CHUNK_OVERLAP: usize = 100;

// Object storage configuration
const DEFAULT_STORAGE_BUCKET: &str = "docuvec-documents";
const DEFAULT_PRESIGN_TTL_SECONDS: u64 = 900;

// Database configuration (safe local defaults)
const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_NAME: &str = "docuvec";
const DEFAULT_DB_USER: &str = "docuvec";
const DEFAULT_DB_PASSWORD: &str = "localdev123";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 2;
const DEFAULT_DB_TIMEOUT_SECONDS: u64 = 30;

// Vector storage configuration
const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
const DEFAULT_VECTOR_TIMEOUT_SECONDS: u64 = 30;

// Pipeline configuration
const DEFAULT_PIPELINE_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_PIPELINE_WORKER_CONCURRENCY: usize = 4;
const DEFAULT_PIPELINE_LEASE_SECONDS: u64 = 300;
const DEFAULT_PIPELINE_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_PIPELINE_BACKOFF_CAP_MS: u64 = 60_000;
const DEFAULT_PIPELINE_MAX_ATTEMPTS: u32 = 5;
// Watch-style stages poll for an external event and are expected to "fail"
// many times before the event arrives.
const DEFAULT_PIPELINE_MAX_POLL_ATTEMPTS: u32 = 100;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Core configuration for the entire docuvec application
///
/// All settings have safe defaults and can be overridden via environment
/// variables. No profile/environment selection needed - same defaults work
/// everywhere.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApplicationConfig {
    /// Embedding model registry seed + dispatch/worker tuning
    pub embedding: EmbeddingConfig,

    /// Adaptive chunker parameters
    pub chunking: ChunkingConfig,

    /// Object storage (blob gateway) configuration
    pub object_store: ObjectStoreConfig,

    /// Vector storage configuration
    pub vector_storage: VectorStorageConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Pipeline orchestrator configuration
    pub pipeline: PipelineConfig,
}

impl ApplicationConfig {
    /// Load the full configuration from environment variables with safe defaults
    pub fn from_env() -> Self {
        Self {
            embedding: EmbeddingConfig::from_env(),
            chunking: ChunkingConfig::from_env(),
            object_store: ObjectStoreConfig::from_env(),
            vector_storage: VectorStorageConfig::from_env(),
            database: DatabaseConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
        }
    }
}

impl validation::Validate for ApplicationConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.embedding.validate()?;
        self.chunking.validate()?;
        self.vector_storage.validate()?;
        self.database.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

/// One embedding model the registry should know about
///
/// The set of models is data, not code: adding a model is a configuration
/// change, not a compiled-in branch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelSpec {
    /// Short alias used everywhere inside the system (e.g. "minilm")
    pub alias: String,

    /// Native model identifier understood by the inference backend
    pub id: String,

    /// Vector width produced by this model - sizes the index collection
    pub dim: usize,

    /// Maximum sequence length the model accepts
    pub max_seq: usize,

    /// Inference endpoint for this model (TEI-style `/embed` service)
    pub endpoint: String,

    /// Profile -> task queue name bindings
    pub queues: HashMap<Profile, String>,
}

impl ModelSpec {
    /// Build a spec with the conventional `embed.{alias}.{profile}` queue names
    pub fn with_default_queues(
        alias: &str,
        id: &str,
        dim: usize,
        max_seq: usize,
        endpoint: &str,
    ) -> Self {
        let queues = Profile::all()
            .iter()
            .map(|p| (*p, format!("embed.{alias}.{p}")))
            .collect();
        Self {
            alias: alias.to_string(),
            id: id.to_string(),
            dim,
            max_seq,
            endpoint: endpoint.to_string(),
            queues,
        }
    }

    /// Queue name bound to the given profile
    pub fn queue_for(&self, profile: Profile) -> Option<&str> {
        self.queues.get(&profile).map(String::as_str)
    }
}

/// Embedding configuration: registry seed plus dispatch and worker tuning
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EmbeddingConfig {
    /// Models to register at startup
    pub models: Vec<ModelSpec>,

    /// Default target aliases per profile (used when a request names none)
    pub default_models: HashMap<Profile, Vec<String>>,

    /// How long the dispatcher waits on each model's reply, per profile
    pub rt_wait_timeout_ms: u64,
    pub bulk_wait_timeout_ms: u64,

    /// Admission gate capacity: concurrent in-flight batches per worker instance
    pub max_inflight: usize,

    /// Texts per micro-batch inside the worker
    pub batch_size: usize,

    /// Coalescing delay inserted between micro-batches
    pub batch_latency_ms: u64,

    /// Retry-after hint carried by overload rejections
    pub retry_after_ms: u64,
}

impl EmbeddingConfig {
    /// Load configuration from environment variables with safe defaults
    ///
    /// `DOCUVEC_EMBEDDING_MODELS` accepts a JSON array of model specs for
    /// full control; the comma-separated `DOCUVEC_EMBEDDING_DEFAULTS_RT` /
    /// `_BULK` variables override the per-profile default alias lists.
    pub fn from_env() -> Self {
        let models = std::env::var("DOCUVEC_EMBEDDING_MODELS")
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<ModelSpec>>(&raw).ok())
            .unwrap_or_else(default_models);

        let mut default_models = HashMap::new();
        default_models.insert(
            Profile::Rt,
            env_alias_list("DOCUVEC_EMBEDDING_DEFAULTS_RT", &models, 1),
        );
        default_models.insert(
            Profile::Bulk,
            env_alias_list("DOCUVEC_EMBEDDING_DEFAULTS_BULK", &models, usize::MAX),
        );

        Self {
            models,
            default_models,
            rt_wait_timeout_ms: env_parse(
                "DOCUVEC_EMBEDDING_RT_WAIT_TIMEOUT_MS",
                DEFAULT_RT_WAIT_TIMEOUT_MS,
            ),
            bulk_wait_timeout_ms: env_parse(
                "DOCUVEC_EMBEDDING_BULK_WAIT_TIMEOUT_MS",
                DEFAULT_BULK_WAIT_TIMEOUT_MS,
            ),
            max_inflight: env_parse("DOCUVEC_EMBEDDING_MAX_INFLIGHT", DEFAULT_EMBED_MAX_INFLIGHT),
            batch_size: env_parse("DOCUVEC_EMBEDDING_BATCH_SIZE", DEFAULT_EMBED_BATCH_SIZE),
            batch_latency_ms: env_parse(
                "DOCUVEC_EMBEDDING_BATCH_LATENCY_MS",
                DEFAULT_EMBED_BATCH_LATENCY_MS,
            ),
            retry_after_ms: env_parse(
                "DOCUVEC_EMBEDDING_RETRY_AFTER_MS",
                DEFAULT_EMBED_RETRY_AFTER_MS,
            ),
        }
    }

    /// Dispatcher wait timeout for the given profile
    pub const fn wait_timeout(&self, profile: Profile) -> Duration {
        match profile {
            Profile::Rt => Duration::from_millis(self.rt_wait_timeout_ms),
            Profile::Bulk => Duration::from_millis(self.bulk_wait_timeout_ms),
        }
    }

    /// Default target aliases for the given profile
    pub fn defaults_for(&self, profile: Profile) -> &[String] {
        self.default_models
            .get(&profile)
            .map_or(&[], Vec::as_slice)
    }
}

fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::with_default_queues(
            "minilm",
            "sentence-transformers/all-MiniLM-L6-v2",
            384,
            512,
            "http://localhost:8080",
        ),
        ModelSpec::with_default_queues(
            "bge-large",
            "BAAI/bge-large-en-v1.5",
            1024,
            512,
            "http://localhost:8081",
        ),
    ]
}

/// Parse a comma-separated alias list from the environment; fall back to the
/// first `take` registered models.
fn env_alias_list(key: &str, models: &[ModelSpec], take: usize) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_else(|| models.iter().take(take).map(|m| m.alias.clone()).collect())
}

impl validation::Validate for EmbeddingConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.models.is_empty() {
            return Err(ConfigError::MissingField {
                field: "embedding.models".to_string(),
            });
        }
        for model in &self.models {
            validation::validate_non_empty(&model.alias, "model.alias")?;
            validation::validate_url(&model.endpoint, "model.endpoint")?;
            validation::validate_range(model.dim as u64, 1, 16_384, "model.dim")?;
            validation::validate_range(model.max_seq as u64, 1, 1_000_000, "model.max_seq")?;
        }
        // Every alias referenced by a default-profile list must resolve
        for (profile, aliases) in &self.default_models {
            for alias in aliases {
                if !self.models.iter().any(|m| &m.alias == alias) {
                    return Err(ConfigError::UnknownModelAlias {
                        alias: alias.clone(),
                        profile: profile.to_string(),
                    });
                }
            }
        }
        validation::validate_range(self.max_inflight as u64, 1, 10_000, "max_inflight")?;
        validation::validate_range(self.batch_size as u64, 1, 10_000, "batch_size")?;
        Ok(())
    }
}

/// Adaptive chunker parameters
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters packed into one chunk
    pub max_chars: usize,

    /// Trailing characters of a full chunk carried into the next
    pub overlap: usize,
}

impl ChunkingConfig {
    /// Load configuration from environment variables with safe defaults
    pub fn from_env() -> Self {
        Self {
            max_chars: env_parse("DOCUVEC_CHUNK_MAX_CHARS", DEFAULT_CHUNK_MAX_CHARS),
            overlap: env_parse("DOCUVEC_CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP),
        }
    }
}

impl validation::Validate for ChunkingConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(self.max_chars as u64, 100, 100_000, "chunking.max_chars")?;
        if self.overlap >= self.max_chars {
            return Err(ConfigError::OutOfRange {
                field: "chunking.overlap".to_string(),
                value: self.overlap as u64,
                min: 0,
                max: (self.max_chars.saturating_sub(1)) as u64,
            });
        }
        Ok(())
    }
}

/// Object storage (blob gateway) configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ObjectStoreConfig {
    /// Bucket holding originals, canonical documents, and vector artifacts
    pub bucket: String,

    /// Time-to-live for presigned URLs
    pub presign_ttl_seconds: u64,
}

impl ObjectStoreConfig {
    /// Load configuration from environment variables with safe defaults
    pub fn from_env() -> Self {
        Self {
            bucket: env_string("DOCUVEC_STORAGE_BUCKET", DEFAULT_STORAGE_BUCKET),
            presign_ttl_seconds: env_parse(
                "DOCUVEC_STORAGE_PRESIGN_TTL_SECONDS",
                DEFAULT_PRESIGN_TTL_SECONDS,
            ),
        }
    }
}

/// Vector storage configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorStorageConfig {
    /// Qdrant server URL
    pub url: String,

    /// Connection timeout in seconds
    pub timeout_seconds: u64,
}

impl VectorStorageConfig {
    /// Load configuration from environment variables with safe defaults
    pub fn from_env() -> Self {
        Self {
            url: env_string("DOCUVEC_VECTOR_STORAGE_URL", DEFAULT_QDRANT_URL),
            timeout_seconds: env_parse(
                "DOCUVEC_VECTOR_STORAGE_TIMEOUT_SECONDS",
                DEFAULT_VECTOR_TIMEOUT_SECONDS,
            ),
        }
    }
}

impl validation::Validate for VectorStorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_url(&self.url, "vector_storage.url")?;
        validation::validate_range(self.timeout_seconds, 1, 3600, "timeout_seconds")?;
        Ok(())
    }
}

/// `PostgreSQL` configuration for the metadata store and persistent task queue
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub timeout_seconds: u64,
}

impl DatabaseConfig {
    /// Load configuration from environment variables with safe defaults
    pub fn from_env() -> Self {
        Self {
            host: env_string("DOCUVEC_DB_HOST", DEFAULT_DB_HOST),
            port: env_parse("DOCUVEC_DB_PORT", DEFAULT_DB_PORT),
            database: env_string("DOCUVEC_DB_NAME", DEFAULT_DB_NAME),
            username: env_string("DOCUVEC_DB_USER", DEFAULT_DB_USER),
            password: env_string("DOCUVEC_DB_PASSWORD", DEFAULT_DB_PASSWORD),
            max_connections: env_parse("DOCUVEC_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            min_connections: env_parse("DOCUVEC_DB_MIN_CONNECTIONS", DEFAULT_DB_MIN_CONNECTIONS),
            timeout_seconds: env_parse("DOCUVEC_DB_TIMEOUT_SECONDS", DEFAULT_DB_TIMEOUT_SECONDS),
        }
    }

    /// Build sqlx connect options (password never logged)
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .password(&self.password)
            .ssl_mode(PgSslMode::Prefer)
    }

    /// Connection string safe for logs (credentials redacted)
    pub fn safe_connection_string(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl validation::Validate for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty(&self.host, "database.host")?;
        validation::validate_non_empty(&self.database, "database.database")?;
        validation::validate_range(u64::from(self.port), 1, 65_535, "database.port")?;
        validation::validate_range(
            u64::from(self.max_connections),
            1,
            1_000,
            "database.max_connections",
        )?;
        if self.min_connections > self.max_connections {
            return Err(ConfigError::Generic {
                message: "database.min_connections must be <= max_connections".to_string(),
            });
        }
        validation::validate_range(self.timeout_seconds, 1, 3_600, "database.timeout_seconds")?;
        Ok(())
    }
}

/// Pipeline orchestrator configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// How often an idle worker polls the queue (milliseconds)
    pub poll_interval_ms: u64,

    /// Concurrent pipeline workers per process
    pub worker_concurrency: usize,

    /// Visibility timeout for claimed tasks (late ack: redelivered on expiry)
    pub lease_seconds: u64,

    /// Exponential backoff base delay
    pub backoff_base_ms: u64,

    /// Exponential backoff cap
    pub backoff_cap_ms: u64,

    /// Retry bound for ordinary stages
    pub max_attempts: u32,

    /// Retry bound for watch-style stages polling external visibility
    pub max_poll_attempts: u32,
}

impl PipelineConfig {
    /// Load configuration from environment variables with safe defaults
    pub fn from_env() -> Self {
        Self {
            poll_interval_ms: env_parse(
                "DOCUVEC_PIPELINE_POLL_INTERVAL_MS",
                DEFAULT_PIPELINE_POLL_INTERVAL_MS,
            ),
            worker_concurrency: env_parse(
                "DOCUVEC_PIPELINE_WORKER_CONCURRENCY",
                DEFAULT_PIPELINE_WORKER_CONCURRENCY,
            ),
            lease_seconds: env_parse(
                "DOCUVEC_PIPELINE_LEASE_SECONDS",
                DEFAULT_PIPELINE_LEASE_SECONDS,
            ),
            backoff_base_ms: env_parse(
                "DOCUVEC_PIPELINE_BACKOFF_BASE_MS",
                DEFAULT_PIPELINE_BACKOFF_BASE_MS,
            ),
            backoff_cap_ms: env_parse(
                "DOCUVEC_PIPELINE_BACKOFF_CAP_MS",
                DEFAULT_PIPELINE_BACKOFF_CAP_MS,
            ),
            max_attempts: env_parse("DOCUVEC_PIPELINE_MAX_ATTEMPTS", DEFAULT_PIPELINE_MAX_ATTEMPTS),
            max_poll_attempts: env_parse(
                "DOCUVEC_PIPELINE_MAX_POLL_ATTEMPTS",
                DEFAULT_PIPELINE_MAX_POLL_ATTEMPTS,
            ),
        }
    }

    /// Backoff delay for the given (zero-based) attempt: `base * 2^attempt`, capped
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16); // 2^16 * base already dwarfs any sane cap
        let delay = self
            .backoff_base_ms
            .saturating_mul(1_u64 << exp)
            .min(self.backoff_cap_ms);
        Duration::from_millis(delay)
    }
}

impl validation::Validate for PipelineConfig {
    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(self.worker_concurrency as u64, 1, 256, "worker_concurrency")?;
        validation::validate_range(u64::from(self.max_attempts), 1, 1_000, "max_attempts")?;
        validation::validate_range(self.lease_seconds, 1, 86_400, "lease_seconds")?;
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(ConfigError::Generic {
                message: "backoff_cap_ms must be >= backoff_base_ms".to_string(),
            });
        }
        Ok(())
    }
}
