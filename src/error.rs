//! Error types for the hardware controller.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the identity provider collaborator.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication credentials were not provided")]
    MissingCredentials,

    #[error("Authentication rejected: {reason}")]
    Rejected { reason: String },

    #[error("Identity provider unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors from the task queue collaborator.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Task queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("Task queue is closed")]
    Closed,

    #[error("Enqueue request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Invalid response from task queue: {reason}")]
    InvalidResponse { reason: String },
}

/// Reasons a job submission was not admitted.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Not a managed host: {worker_id}")]
    UnrecognizedHost { worker_id: String },

    #[error("Client {client_id} lacks the scopes required for task {task_name}")]
    Unauthorized { task_name: String, client_id: String },

    #[error("Submission failed: {0}")]
    Submission(#[from] QueueError),
}

/// Field name → human-readable messages, serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded for `field`, if any.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(" "))?;
        }
        Ok(())
    }
}
