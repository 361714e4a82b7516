//! Job request data model.

use serde::Serialize;

/// Task name that skips the managed-host check.
pub const PING_TASK: &str = "ping";

/// Worker group used when the caller does not supply one.
pub const DEFAULT_WORKER_GROUP: &str = "none";

/// Field values as collected from the transport layer, before validation.
#[derive(Debug, Clone, Default)]
pub struct RawJobFields {
    pub worker_id: Option<String>,
    pub worker_group: Option<String>,
    pub task_name: Option<String>,
    pub provisioner_id: Option<String>,
    pub worker_type: Option<String>,
    pub http_origin: Option<String>,
}

/// A validated job submission.
///
/// Built only by the validator. `task_id` stays empty until the task queue
/// has accepted the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRequest {
    pub worker_id: String,
    pub worker_group: String,
    pub client_id: String,
    pub task_name: String,
    pub provisioner_id: String,
    pub worker_type: String,
    pub http_origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl JobRequest {
    /// Attach the identifier returned by the task queue.
    pub(crate) fn with_task_id(mut self, task_id: String) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

/// Identity and granted scopes produced by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedCaller {
    pub client_id: String,
    pub scopes: Vec<String>,
}

impl AuthenticatedCaller {
    pub fn new(client_id: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scopes,
        }
    }
}
