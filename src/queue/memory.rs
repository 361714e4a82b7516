//! In-process task queue backed by a bounded channel.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{JobPayload, TaskQueue};
use crate::admission::JobRequest;
use crate::error::QueueError;

/// A job accepted by the in-process queue.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub payload: JobPayload,
}

/// Bounded in-process queue. `enqueue` never waits for capacity.
pub struct InMemoryTaskQueue {
    tx: mpsc::Sender<QueuedJob>,
    capacity: usize,
}

impl InMemoryTaskQueue {
    /// Create a queue and the receiver its jobs are delivered to.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueuedJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, job: &JobRequest) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        let queued = QueuedJob {
            id: id.clone(),
            payload: JobPayload::new(job),
        };

        self.tx.try_send(queued).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(capacity = self.capacity, "In-process task queue is full");
                QueueError::Full {
                    capacity: self.capacity,
                }
            }
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;

        debug!(task_id = %id, task_name = %job.task_name, "Job placed on in-process queue");
        Ok(id)
    }
}

/// Spawn a background task that drains the in-process queue.
///
/// Jobs are logged for the worker pool that executes them; this service
/// never runs tasks itself.
pub fn spawn_job_drain(mut rx: mpsc::Receiver<QueuedJob>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            info!(
                task_id = %job.id,
                task_name = %job.payload.job.task_name,
                worker_id = %job.payload.job.worker_id,
                queued_at = %job.payload.queued_at,
                "Dispatching queued job"
            );
        }
        debug!("In-process task queue closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(task_name: &str) -> JobRequest {
        JobRequest {
            worker_id: "t-yosemite-r7-380".into(),
            worker_group: "none".into(),
            client_id: "client".into(),
            task_name: task_name.into(),
            provisioner_id: String::new(),
            worker_type: String::new(),
            http_origin: String::new(),
            task_id: None,
        }
    }

    #[tokio::test]
    async fn enqueue_delivers_to_receiver() {
        let (queue, mut rx) = InMemoryTaskQueue::new(4);
        let id = queue.enqueue(&job("reboot")).await.unwrap();

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.id, id);
        assert_eq!(queued.payload.job.task_name, "reboot");
    }

    #[tokio::test]
    async fn every_enqueue_gets_a_new_id() {
        let (queue, _rx) = InMemoryTaskQueue::new(4);
        let first = queue.enqueue(&job("reboot")).await.unwrap();
        let second = queue.enqueue(&job("reboot")).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn full_queue_fails_without_blocking() {
        let (queue, _rx) = InMemoryTaskQueue::new(1);
        queue.enqueue(&job("reboot")).await.unwrap();
        let err = queue.enqueue(&job("reboot")).await.unwrap_err();
        assert!(matches!(err, QueueError::Full { capacity: 1 }));
    }

    #[tokio::test]
    async fn dropped_receiver_closes_queue() {
        let (queue, rx) = InMemoryTaskQueue::new(4);
        drop(rx);
        let err = queue.enqueue(&job("ping")).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }

    #[tokio::test]
    async fn drain_consumes_jobs() {
        let (queue, rx) = InMemoryTaskQueue::new(1);
        let handle = spawn_job_drain(rx);

        queue.enqueue(&job("reboot")).await.unwrap();
        // Capacity frees up once the drain has taken the first job.
        let mut accepted = false;
        for _ in 0..50 {
            if queue.enqueue(&job("reboot")).await.is_ok() {
                accepted = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(accepted);

        drop(queue);
        handle.await.unwrap();
    }
}
