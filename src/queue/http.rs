//! HTTP task queue — posts jobs to an external broker endpoint.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{JobPayload, TaskQueue};
use crate::admission::JobRequest;
use crate::error::QueueError;

#[derive(Debug, Serialize)]
struct EnqueueRequest<'a> {
    task: &'a str,
    kwargs: JobPayload,
}

#[derive(Debug, Deserialize)]
struct EnqueueResponse {
    id: Option<String>,
}

/// Task queue reached over HTTP.
pub struct HttpTaskQueue {
    client: reqwest::Client,
    url: String,
    token: Option<SecretString>,
}

impl HttpTaskQueue {
    pub fn new(
        url: String,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, QueueError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueueError::RequestFailed {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl TaskQueue for HttpTaskQueue {
    async fn enqueue(&self, job: &JobRequest) -> Result<String, QueueError> {
        let body = EnqueueRequest {
            task: &job.task_name,
            kwargs: JobPayload::new(job),
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| QueueError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(QueueError::RequestFailed {
                reason: format!("broker returned {}: {}", status, text),
            });
        }

        let parsed: EnqueueResponse =
            resp.json()
                .await
                .map_err(|e| QueueError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        match parsed.id {
            Some(id) if !id.is_empty() => {
                debug!(task_id = %id, task_name = %job.task_name, "Job accepted by broker");
                Ok(id)
            }
            _ => Err(QueueError::InvalidResponse {
                reason: "response did not contain a job id".into(),
            }),
        }
    }
}
