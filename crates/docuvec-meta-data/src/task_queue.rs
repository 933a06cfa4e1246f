//! Persistent priority task queue
//!
//! PostgreSQL-backed queue using the FOR UPDATE SKIP LOCKED claim pattern
//! so any number of workers can poll concurrently without double-delivery.
//! Tasks carry a priority tier (lower dequeues first), a visibility
//! timeout lease, and bounded retry counting with late acknowledgement:
//! a crashed worker's in-flight task is redelivered after its lease
//! expires rather than lost.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{DatabaseResult, SqlxResultExt};

/// A claimed task as handed to a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: Uuid,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub priority: i16,
    /// Zero-based delivery attempt of the current claim
    pub attempt: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a negative acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Task went back to the queue, visible after the given delay
    Requeued { attempt: i32 },
    /// Retry budget exhausted; task is failed and will not redeliver
    Exhausted,
}

/// Queue depth statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Insert a task, optionally delayed. Returns the task id.
    async fn enqueue(
        &self,
        task_type: &str,
        payload: serde_json::Value,
        priority: i16,
        max_attempts: i32,
        delay: Option<Duration>,
    ) -> DatabaseResult<Uuid>;

    /// Claim the highest-priority visible task for `lease`, or None when
    /// the queue is empty. The claim is atomic across workers.
    async fn dequeue(&self, worker_id: &str, lease: Duration) -> DatabaseResult<Option<QueuedTask>>;

    /// Late acknowledgement after successful completion
    async fn ack(&self, task_id: Uuid) -> DatabaseResult<()>;

    /// Report failure: requeue with delay, or fail permanently once the
    /// retry budget is spent.
    async fn nack(&self, task_id: Uuid, error: &str, delay: Duration)
    -> DatabaseResult<NackOutcome>;

    /// Return expired-lease tasks to the queue (background recovery).
    /// Returns how many were recovered.
    async fn recover_expired(&self) -> DatabaseResult<u64>;

    async fn depth(&self) -> DatabaseResult<QueueDepth>;
}

/// `PostgreSQL` implementation of the task queue
#[derive(Clone)]
pub struct PostgresTaskQueue {
    pool: PgPool,
}

impl PostgresTaskQueue {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskQueue for PostgresTaskQueue {
    async fn enqueue(
        &self,
        task_type: &str,
        payload: serde_json::Value,
        priority: i16,
        max_attempts: i32,
        delay: Option<Duration>,
    ) -> DatabaseResult<Uuid> {
        let id = Uuid::new_v4();
        let visible_after = delay.map(|d| {
            Utc::now() + chrono::Duration::milliseconds(i64::try_from(d.as_millis()).unwrap_or(0))
        });
        sqlx::query(
            r"
            INSERT INTO pipeline_task_queue
                (id, task_type, payload, priority, max_attempts, status, visible_after)
            VALUES ($1, $2, $3, $4, $5, 'queued', $6)
            ",
        )
        .bind(id)
        .bind(task_type)
        .bind(&payload)
        .bind(priority)
        .bind(max_attempts)
        .bind(visible_after)
        .execute(&self.pool)
        .await
        .map_db_err("enqueue")?;
        Ok(id)
    }

    async fn dequeue(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> DatabaseResult<Option<QueuedTask>> {
        let now = Utc::now();
        let lease_until =
            now + chrono::Duration::milliseconds(i64::try_from(lease.as_millis()).unwrap_or(0));

        // SKIP LOCKED pattern: claim one task atomically, best priority
        // first, oldest first within a tier
        let row = sqlx::query(
            r"
            WITH claimed AS (
                SELECT pipeline_task_queue.id
                FROM pipeline_task_queue
                WHERE status = 'queued'
                  AND (visible_after IS NULL OR visible_after <= $1)
                ORDER BY priority, created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE pipeline_task_queue
            SET status = 'processing',
                claimed_at = $1,
                claimed_by = $2,
                visible_after = $3
            FROM claimed
            WHERE pipeline_task_queue.id = claimed.id
            RETURNING pipeline_task_queue.id,
                      pipeline_task_queue.task_type,
                      pipeline_task_queue.payload,
                      pipeline_task_queue.priority,
                      pipeline_task_queue.attempt,
                      pipeline_task_queue.max_attempts,
                      pipeline_task_queue.last_error,
                      pipeline_task_queue.created_at
            ",
        )
        .bind(now)
        .bind(worker_id)
        .bind(lease_until)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("dequeue")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(QueuedTask {
            id: row.try_get("id").map_db_err("dequeue_row")?,
            task_type: row.try_get("task_type").map_db_err("dequeue_row")?,
            payload: row.try_get("payload").map_db_err("dequeue_row")?,
            priority: row.try_get("priority").map_db_err("dequeue_row")?,
            attempt: row.try_get("attempt").map_db_err("dequeue_row")?,
            max_attempts: row.try_get("max_attempts").map_db_err("dequeue_row")?,
            last_error: row.try_get("last_error").map_db_err("dequeue_row")?,
            created_at: row.try_get("created_at").map_db_err("dequeue_row")?,
        }))
    }

    async fn ack(&self, task_id: Uuid) -> DatabaseResult<()> {
        sqlx::query(
            r"
            UPDATE pipeline_task_queue
            SET status = 'completed',
                completed_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_db_err("ack")?;
        Ok(())
    }

    async fn nack(
        &self,
        task_id: Uuid,
        error: &str,
        delay: Duration,
    ) -> DatabaseResult<NackOutcome> {
        let visible_after = Utc::now()
            + chrono::Duration::milliseconds(i64::try_from(delay.as_millis()).unwrap_or(0));
        let row = sqlx::query(
            r"
            UPDATE pipeline_task_queue
            SET attempt = attempt + 1,
                status = CASE
                    WHEN attempt + 1 >= max_attempts THEN 'failed'
                    ELSE 'queued'
                END,
                last_error = $2,
                claimed_at = NULL,
                claimed_by = NULL,
                visible_after = CASE
                    WHEN attempt + 1 >= max_attempts THEN NULL
                    ELSE $3
                END
            WHERE id = $1
            RETURNING status, attempt
            ",
        )
        .bind(task_id)
        .bind(error)
        .bind(visible_after)
        .fetch_one(&self.pool)
        .await
        .map_db_err("nack")?;

        let status: String = row.try_get("status").map_db_err("nack_row")?;
        let attempt: i32 = row.try_get("attempt").map_db_err("nack_row")?;
        if status == "failed" {
            Ok(NackOutcome::Exhausted)
        } else {
            Ok(NackOutcome::Requeued { attempt })
        }
    }

    async fn recover_expired(&self) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r"
            UPDATE pipeline_task_queue
            SET status = 'queued',
                claimed_at = NULL,
                claimed_by = NULL,
                visible_after = NULL
            WHERE status = 'processing'
              AND visible_after < $1
            ",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_db_err("recover_expired")?;
        Ok(result.rows_affected())
    }

    async fn depth(&self) -> DatabaseResult<QueueDepth> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) FILTER (WHERE status = 'queued') as queued,
                COUNT(*) FILTER (WHERE status = 'processing') as processing,
                COUNT(*) FILTER (WHERE status = 'completed') as completed,
                COUNT(*) FILTER (WHERE status = 'failed') as failed
            FROM pipeline_task_queue
            ",
        )
        .fetch_one(&self.pool)
        .await
        .map_db_err("depth")?;
        Ok(QueueDepth {
            queued: row.try_get("queued").map_db_err("depth_row")?,
            processing: row.try_get("processing").map_db_err("depth_row")?,
            completed: row.try_get("completed").map_db_err("depth_row")?,
            failed: row.try_get("failed").map_db_err("depth_row")?,
        })
    }
}
