//! Job admission — validate, check host, authorize, enqueue.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::model::{AuthenticatedCaller, JobRequest, RawJobFields};
use super::scopes::ScopeAuthorizer;
use super::validator::{JobRequestValidator, ValidationFailure};
use crate::config::ControllerConfig;
use crate::error::AdmissionError;
use crate::queue::TaskQueue;

/// Decides whether a submission may enqueue work and hands it to the queue.
///
/// Holds no mutable state; one instance is shared across all requests.
pub struct JobAdmissionHandler {
    validator: JobRequestValidator,
    authorizer: ScopeAuthorizer,
    queue: Arc<dyn TaskQueue>,
}

impl JobAdmissionHandler {
    pub fn new(
        validator: JobRequestValidator,
        authorizer: ScopeAuthorizer,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            validator,
            authorizer,
            queue,
        }
    }

    /// Build the validator and authorizer from configuration.
    pub fn from_config(config: &ControllerConfig, queue: Arc<dyn TaskQueue>) -> Self {
        let validator = JobRequestValidator::new(
            config.worker_id_pattern.clone(),
            config.task_names.clone(),
        );
        let authorizer = ScopeAuthorizer::for_tasks(&config.service_name, &config.task_names);
        Self::new(validator, authorizer, queue)
    }

    /// Admit a single submission.
    ///
    /// Every call that passes validation and authorization enqueues a new
    /// job; nothing is deduplicated.
    pub async fn submit(
        &self,
        raw: RawJobFields,
        caller: &AuthenticatedCaller,
    ) -> Result<JobRequest, AdmissionError> {
        let job = match self.validator.validate(raw, &caller.client_id) {
            Ok(job) => job,
            Err(ValidationFailure::Fields(errors)) => {
                warn!(client_id = %caller.client_id, errors = %errors, "Job request validation failed");
                return Err(AdmissionError::Validation(errors));
            }
            Err(ValidationFailure::UnrecognizedHost { worker_id }) => {
                warn!(worker_id = %worker_id, client_id = %caller.client_id, "Not a managed host");
                return Err(AdmissionError::UnrecognizedHost { worker_id });
            }
        };

        if !self.authorizer.is_authorized(&job.task_name, &caller.scopes) {
            warn!(
                client_id = %caller.client_id,
                task_name = %job.task_name,
                "Caller lacks required scopes"
            );
            return Err(AdmissionError::Unauthorized {
                task_name: job.task_name,
                client_id: caller.client_id.clone(),
            });
        }

        let task_id = self.queue.enqueue(&job).await.map_err(|e| {
            error!(task_name = %job.task_name, error = %e, "Failed to enqueue job");
            AdmissionError::Submission(e)
        })?;

        info!(
            task_name = %job.task_name,
            task_id = %task_id,
            worker_id = %job.worker_id,
            "Queued task"
        );

        Ok(job.with_task_id(task_id))
    }
}
