//! Task queue collaborator.
//!
//! The admission path only needs one capability from a queue: accept a job
//! payload and hand back a tracking id without waiting for the job to run.

pub mod http;
pub mod memory;

pub use http::HttpTaskQueue;
pub use memory::{InMemoryTaskQueue, QueuedJob, spawn_job_drain};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::admission::JobRequest;
use crate::config::TaskQueueConfig;
use crate::error::QueueError;

/// Anything that can accept a validated job and return its id.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue `job` and return the identifier assigned by the queue.
    async fn enqueue(&self, job: &JobRequest) -> Result<String, QueueError>;
}

/// Payload handed to the queue: the validated request plus enqueue time.
#[derive(Debug, Clone, Serialize)]
pub struct JobPayload {
    #[serde(flatten)]
    pub job: JobRequest,
    pub queued_at: DateTime<Utc>,
}

impl JobPayload {
    pub fn new(job: &JobRequest) -> Self {
        let mut job = job.clone();
        job.task_id = None;
        Self {
            job,
            queued_at: Utc::now(),
        }
    }
}

/// Build the queue selected by configuration.
///
/// Returns the in-process receiver alongside the queue when no external
/// broker is configured, so the caller can drain it. That queue has no
/// worker pool behind it and is meant for local runs and tests.
pub fn create_queue(
    config: &TaskQueueConfig,
) -> Result<(Arc<dyn TaskQueue>, Option<tokio::sync::mpsc::Receiver<QueuedJob>>), QueueError> {
    match &config.url {
        Some(url) => {
            tracing::info!(url = %url, "Using HTTP task queue");
            let queue = HttpTaskQueue::new(url.clone(), config.token.clone(), config.timeout)?;
            Ok((Arc::new(queue), None))
        }
        None => {
            tracing::warn!(
                capacity = config.capacity,
                "Using in-process task queue; jobs are logged and never executed"
            );
            let (queue, rx) = InMemoryTaskQueue::new(config.capacity);
            Ok((Arc::new(queue), Some(rx)))
        }
    }
}
