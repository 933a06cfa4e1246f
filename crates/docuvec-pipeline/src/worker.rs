//! Priority-polling pipeline worker
//!
//! Workers claim one task at a time under a visibility lease and
//! acknowledge only after the stage completes (late ack), so a crashed
//! worker's in-flight task is redelivered rather than lost. Retryable
//! stage failures nack with exponential backoff; exhausted retries and
//! fatal failures mark the document `error`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use docuvec_config::PipelineConfig;
use docuvec_meta_data::{DocumentRepository, NackOutcome, QueuedTask, TaskQueue};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::envelope::{StageKind, TaskEnvelope};
use crate::error::{PipelineError, PipelineResult, StageError};
use crate::stages::{ChunkStage, DeleteStage, EmbedStage, IndexStage, NormalizeStage};

/// All stage implementations behind one dispatch point
pub struct StageRunner {
    pub normalize: NormalizeStage,
    pub chunk: ChunkStage,
    pub embed: EmbedStage,
    pub index: IndexStage,
    pub delete: DeleteStage,
}

impl StageRunner {
    pub async fn run(&self, envelope: &TaskEnvelope) -> Result<Option<TaskEnvelope>, StageError> {
        match envelope.stage {
            StageKind::Normalize => self.normalize.run(envelope).await,
            StageKind::Chunk => self.chunk.run(envelope).await,
            StageKind::Embed => self.embed.run(envelope).await,
            StageKind::Index => self.index.run(envelope).await,
            StageKind::Delete => self.delete.run(envelope).await,
        }
    }
}

/// Retry budget per stage. Normalize polls for upload visibility, so it
/// gets the high polling bound.
pub(crate) fn stage_max_attempts(config: &PipelineConfig, stage: StageKind) -> i32 {
    let bound = match stage {
        StageKind::Normalize => config.max_poll_attempts,
        _ => config.max_attempts,
    };
    i32::try_from(bound).unwrap_or(i32::MAX)
}

pub struct PipelineWorker {
    queue: Arc<dyn TaskQueue>,
    repository: Arc<dyn DocumentRepository>,
    stages: Arc<StageRunner>,
    config: PipelineConfig,
    shutdown: Arc<AtomicBool>,
}

impl PipelineWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        repository: Arc<dyn DocumentRepository>,
        stages: Arc<StageRunner>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            queue,
            repository,
            stages,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for graceful shutdown
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Main loop: spawns the configured number of worker slots plus a
    /// lease-recovery task, and joins them on shutdown.
    pub async fn run(&self) {
        info!(
            workers = self.config.worker_concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            "Pipeline worker pool started"
        );

        let mut join_set = JoinSet::new();
        for slot in 0..self.config.worker_concurrency {
            let queue = Arc::clone(&self.queue);
            let repository = Arc::clone(&self.repository);
            let stages = Arc::clone(&self.stages);
            let config = self.config.clone();
            let shutdown = Arc::clone(&self.shutdown);
            join_set.spawn(async move {
                worker_loop(format!("pipeline-{slot}"), queue, repository, stages, config, shutdown)
                    .await;
            });
        }

        let queue = Arc::clone(&self.queue);
        let shutdown = Arc::clone(&self.shutdown);
        let lease = Duration::from_secs(self.config.lease_seconds);
        join_set.spawn(async move {
            recovery_loop(queue, shutdown, lease).await;
        });

        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }
        info!("Pipeline worker pool stopped");
    }

    /// Claim and process a single task. Returns the task id, or `None`
    /// when the queue has nothing visible. Integration tests drive the
    /// pipeline step by step through this.
    pub async fn process_one(&self, worker_id: &str) -> PipelineResult<Option<Uuid>> {
        let lease = Duration::from_secs(self.config.lease_seconds);
        match self.queue.dequeue(worker_id, lease).await? {
            Some(task) => {
                let task_id = task.id;
                handle_task(&self.queue, &self.repository, &self.stages, &self.config, task)
                    .await?;
                Ok(Some(task_id))
            }
            None => Ok(None),
        }
    }
}

async fn worker_loop(
    worker_id: String,
    queue: Arc<dyn TaskQueue>,
    repository: Arc<dyn DocumentRepository>,
    stages: Arc<StageRunner>,
    config: PipelineConfig,
    shutdown: Arc<AtomicBool>,
) {
    let lease = Duration::from_secs(config.lease_seconds);
    let poll_interval = Duration::from_millis(config.poll_interval_ms);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::debug!(worker_id, "Shutdown signal received");
            break;
        }
        match queue.dequeue(&worker_id, lease).await {
            Ok(Some(task)) => {
                if let Err(e) = handle_task(&queue, &repository, &stages, &config, task).await {
                    error!(worker_id, error = %e, "Task handling failed");
                }
            }
            Ok(None) => sleep(poll_interval).await,
            Err(e) => {
                error!(worker_id, error = %e, "Dequeue failed");
                sleep(poll_interval * 5).await;
            }
        }
    }
}

/// Background sweep returning expired-lease tasks to the queue
async fn recovery_loop(queue: Arc<dyn TaskQueue>, shutdown: Arc<AtomicBool>, lease: Duration) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        match queue.recover_expired().await {
            Ok(0) => {}
            Ok(recovered) => warn!(recovered, "Recovered tasks from expired leases"),
            Err(e) => error!(error = %e, "Lease recovery failed"),
        }
        sleep(lease / 2).await;
    }
}

async fn handle_task(
    queue: &Arc<dyn TaskQueue>,
    repository: &Arc<dyn DocumentRepository>,
    stages: &Arc<StageRunner>,
    config: &PipelineConfig,
    task: QueuedTask,
) -> PipelineResult<()> {
    let envelope: TaskEnvelope = match serde_json::from_value(task.payload.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            // Poison payload: no document to mark, drop the task
            error!(task_id = %task.id, task_type = %task.task_type, error = %e, "Unparseable task payload, dropping");
            queue.ack(task.id).await?;
            return Ok(());
        }
    };

    match stages.run(&envelope).await {
        Ok(next) => {
            if let Some(next) = next {
                let payload = serde_json::to_value(&next).map_err(PipelineError::from)?;
                queue
                    .enqueue(
                        next.stage.as_str(),
                        payload,
                        next.stage.priority().value(),
                        stage_max_attempts(config, next.stage),
                        None,
                    )
                    .await?;
            }
            queue.ack(task.id).await?;
        }
        Err(StageError::Retryable(message)) => {
            let delay = config.backoff_delay(u32::try_from(task.attempt).unwrap_or(0));
            match queue.nack(task.id, &message, delay).await? {
                NackOutcome::Requeued { attempt } => {
                    warn!(
                        correlation_id = %envelope.correlation_id,
                        document_id = %envelope.document_id,
                        stage = %envelope.stage,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Stage failed, retrying: {message}"
                    );
                }
                NackOutcome::Exhausted => {
                    error!(
                        correlation_id = %envelope.correlation_id,
                        document_id = %envelope.document_id,
                        stage = %envelope.stage,
                        "Retry budget exhausted: {message}"
                    );
                    mark_document_error(repository, &envelope, &message).await;
                }
            }
        }
        Err(StageError::Fatal(message)) => {
            error!(
                correlation_id = %envelope.correlation_id,
                document_id = %envelope.document_id,
                stage = %envelope.stage,
                "Fatal stage failure: {message}"
            );
            mark_document_error(repository, &envelope, &message).await;
            queue.ack(task.id).await?;
        }
    }
    Ok(())
}

async fn mark_document_error(
    repository: &Arc<dyn DocumentRepository>,
    envelope: &TaskEnvelope,
    message: &str,
) {
    if let Err(e) = repository.mark_error(envelope.document_id, message).await {
        // Document may already be deleted; the failure is logged, not fatal
        warn!(document_id = %envelope.document_id, error = %e, "Could not record document error");
    }
}
