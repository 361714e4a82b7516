//! Job request validation.

use regex::Regex;
use tracing::debug;

use super::model::{DEFAULT_WORKER_GROUP, JobRequest, PING_TASK, RawJobFields};
use crate::error::FieldErrors;

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";

/// Why a set of raw fields did not produce a [`JobRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// One or more fields are missing or malformed.
    Fields(FieldErrors),
    /// The request is well-formed but the worker id is not a managed host.
    UnrecognizedHost { worker_id: String },
}

/// Turns raw transport fields into a [`JobRequest`].
#[derive(Debug, Clone)]
pub struct JobRequestValidator {
    worker_id_pattern: Regex,
    task_names: Vec<String>,
}

impl JobRequestValidator {
    /// `worker_id_pattern` is expected to be anchored already; see
    /// [`crate::config::compile_worker_id_pattern`].
    pub fn new(worker_id_pattern: Regex, task_names: Vec<String>) -> Self {
        Self {
            worker_id_pattern,
            task_names,
        }
    }

    /// Whether an already lower-cased worker id names a managed host.
    pub fn is_managed_host(&self, worker_id: &str) -> bool {
        self.worker_id_pattern.is_match(worker_id)
    }

    /// Validate `raw` on behalf of `client_id`.
    ///
    /// Field errors are all reported together. The managed-host check only
    /// runs once the fields are structurally valid, and is skipped for ping.
    pub fn validate(
        &self,
        raw: RawJobFields,
        client_id: &str,
    ) -> Result<JobRequest, ValidationFailure> {
        let mut errors = FieldErrors::new();

        let worker_id = raw.worker_id.map(|id| id.trim().to_lowercase());
        let task_name = raw.task_name.map(|name| name.trim().to_string());
        match worker_id.as_deref() {
            None => errors.add("worker_id", REQUIRED),
            Some("") => errors.add("worker_id", BLANK),
            Some(_) => {}
        }

        match task_name.as_deref() {
            None => errors.add("task_name", REQUIRED),
            Some("") => errors.add("task_name", BLANK),
            Some(name) if !self.task_names.iter().any(|t| t == name) => {
                errors.add("task_name", format!("\"{}\" is not a valid choice.", name))
            }
            Some(_) => {}
        }

        if client_id.is_empty() {
            errors.add("client_id", BLANK);
        }

        if !errors.is_empty() {
            debug!(errors = %errors, "Job request failed field validation");
            return Err(ValidationFailure::Fields(errors));
        }

        let worker_id = worker_id.unwrap_or_default();
        let task_name = task_name.unwrap_or_default();

        if task_name != PING_TASK && !self.is_managed_host(&worker_id) {
            return Err(ValidationFailure::UnrecognizedHost { worker_id });
        }

        Ok(JobRequest {
            worker_id,
            worker_group: raw
                .worker_group
                .unwrap_or_else(|| DEFAULT_WORKER_GROUP.to_string()),
            client_id: client_id.to_string(),
            task_name,
            provisioner_id: raw.provisioner_id.unwrap_or_default(),
            worker_type: raw.worker_type.unwrap_or_default(),
            http_origin: raw.http_origin.unwrap_or_default(),
            task_id: None,
        })
    }
}
