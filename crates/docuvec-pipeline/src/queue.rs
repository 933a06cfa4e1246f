//! In-memory task queue for tests and single-process local runs
//!
//! Implements the same `TaskQueue` trait as the Postgres queue: priority
//! ordering, delayed visibility, lease-based redelivery, and bounded
//! retries. State is a single mutex-guarded vec; contention is not a
//! concern in the contexts this backend serves.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docuvec_meta_data::{DatabaseError, DatabaseResult, NackOutcome, QueueDepth, QueuedTask, TaskQueue};
use uuid::Uuid;

struct TaskEntry {
    task: QueuedTask,
    status: &'static str,
    visible_after: Option<DateTime<Utc>>,
    lease_until: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct InMemoryTaskQueue {
    entries: Mutex<Vec<TaskEntry>>,
}

impl InMemoryTaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TaskEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn delay_to_instant(delay: Duration) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(
        &self,
        task_type: &str,
        payload: serde_json::Value,
        priority: i16,
        max_attempts: i32,
        delay: Option<Duration>,
    ) -> DatabaseResult<Uuid> {
        let id = Uuid::new_v4();
        self.lock().push(TaskEntry {
            task: QueuedTask {
                id,
                task_type: task_type.to_string(),
                payload,
                priority,
                attempt: 0,
                max_attempts,
                last_error: None,
                created_at: Utc::now(),
            },
            status: "queued",
            visible_after: delay.map(Self::delay_to_instant),
            lease_until: None,
        });
        tracing::debug!(task_id = %id, task_type, priority, "Enqueued task");
        Ok(id)
    }

    async fn dequeue(
        &self,
        worker_id: &str,
        lease: Duration,
    ) -> DatabaseResult<Option<QueuedTask>> {
        let mut entries = self.lock();
        let now = Utc::now();
        let next = entries
            .iter_mut()
            .filter(|e| e.status == "queued" && e.visible_after.is_none_or(|t| t <= now))
            .min_by_key(|e| (e.task.priority, e.task.created_at));
        Ok(next.map(|entry| {
            entry.status = "processing";
            entry.lease_until = Some(Self::delay_to_instant(lease));
            tracing::debug!(task_id = %entry.task.id, worker_id, "Claimed task");
            entry.task.clone()
        }))
    }

    async fn ack(&self, task_id: Uuid) -> DatabaseResult<()> {
        let mut entries = self.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.task.id == task_id) {
            entry.status = "completed";
            entry.lease_until = None;
        }
        Ok(())
    }

    async fn nack(
        &self,
        task_id: Uuid,
        error: &str,
        delay: Duration,
    ) -> DatabaseResult<NackOutcome> {
        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.task.id == task_id)
            .ok_or(DatabaseError::NotFound {
                entity: "queued task",
                id: task_id.to_string(),
            })?;
        entry.task.attempt += 1;
        entry.task.last_error = Some(error.to_string());
        entry.lease_until = None;
        if entry.task.attempt >= entry.task.max_attempts {
            entry.status = "failed";
            Ok(NackOutcome::Exhausted)
        } else {
            entry.status = "queued";
            entry.visible_after = Some(Self::delay_to_instant(delay));
            Ok(NackOutcome::Requeued {
                attempt: entry.task.attempt,
            })
        }
    }

    async fn recover_expired(&self) -> DatabaseResult<u64> {
        let mut entries = self.lock();
        let now = Utc::now();
        let mut recovered = 0_u64;
        for entry in entries
            .iter_mut()
            .filter(|e| e.status == "processing" && e.lease_until.is_some_and(|t| t < now))
        {
            entry.status = "queued";
            entry.visible_after = None;
            entry.lease_until = None;
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn depth(&self) -> DatabaseResult<QueueDepth> {
        let entries = self.lock();
        let count = |s: &str| entries.iter().filter(|e| e.status == s).count() as i64;
        Ok(QueueDepth {
            queued: count("queued"),
            processing: count("processing"),
            completed: count("completed"),
            failed: count("failed"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dequeues_by_priority_then_age() {
        let queue = InMemoryTaskQueue::new();
        queue
            .enqueue("embed", serde_json::json!({}), 3, 3, None)
            .await
            .unwrap();
        let chat = queue
            .enqueue("chat", serde_json::json!({}), 0, 3, None)
            .await
            .unwrap();

        let first = queue
            .dequeue("w1", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, chat);
    }

    #[tokio::test]
    async fn delayed_task_is_invisible_until_due() {
        let queue = InMemoryTaskQueue::new();
        queue
            .enqueue(
                "chunk",
                serde_json::json!({}),
                3,
                3,
                Some(Duration::from_secs(60)),
            )
            .await
            .unwrap();
        assert!(
            queue
                .dequeue("w1", Duration::from_secs(30))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn nack_requeues_then_exhausts() {
        let queue = InMemoryTaskQueue::new();
        let id = queue
            .enqueue("chunk", serde_json::json!({}), 3, 2, None)
            .await
            .unwrap();

        queue.dequeue("w1", Duration::from_secs(30)).await.unwrap();
        assert!(matches!(
            queue.nack(id, "boom", Duration::ZERO).await.unwrap(),
            NackOutcome::Requeued { attempt: 1 }
        ));
        queue.dequeue("w1", Duration::from_secs(30)).await.unwrap();
        assert!(matches!(
            queue.nack(id, "boom", Duration::ZERO).await.unwrap(),
            NackOutcome::Exhausted
        ));

        let depth = queue.depth().await.unwrap();
        assert_eq!(depth.failed, 1);
        assert_eq!(depth.queued, 0);
    }

    #[tokio::test]
    async fn expired_lease_is_recovered_for_redelivery() {
        let queue = InMemoryTaskQueue::new();
        let id = queue
            .enqueue("index", serde_json::json!({}), 3, 3, None)
            .await
            .unwrap();

        // Zero-length lease expires immediately
        queue.dequeue("w1", Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.recover_expired().await.unwrap(), 1);

        let redelivered = queue
            .dequeue("w2", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(redelivered.id, id);
    }

    #[tokio::test]
    async fn ack_completes_and_stops_redelivery() {
        let queue = InMemoryTaskQueue::new();
        let id = queue
            .enqueue("normalize", serde_json::json!({}), 1, 3, None)
            .await
            .unwrap();
        queue.dequeue("w1", Duration::from_secs(30)).await.unwrap();
        queue.ack(id).await.unwrap();

        assert!(
            queue
                .dequeue("w1", Duration::from_secs(30))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(queue.depth().await.unwrap().completed, 1);
    }
}
