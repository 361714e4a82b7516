//! Configuration types.
//!
//! Everything is read once at startup into a [`ControllerConfig`] that is
//! handed to the components explicitly; nothing reads the environment later.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderValue;
use regex::Regex;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Service name used to derive required scopes.
pub const DEFAULT_SERVICE_NAME: &str = "relops-hardware-controller";

/// Upper bound for `TASK_QUEUE_CAPACITY`.
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// Task names accepted when `TASK_NAMES` is unset.
pub const DEFAULT_TASK_NAMES: &[&str] = &["reboot", "ping"];

/// Identity provider configuration.
#[derive(Debug, Clone)]
pub struct TaskclusterConfig {
    /// Root URL of the Taskcluster deployment.
    pub root_url: String,
    /// Timeout for a single authentication call.
    pub timeout: Duration,
}

/// Task queue configuration.
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    /// External broker endpoint. `None` selects the in-process queue, which
    /// `from_lookup` only allows with `TASK_QUEUE_IN_PROCESS=true`.
    pub url: Option<String>,
    /// Bearer token sent to the broker.
    pub token: Option<SecretString>,
    /// Timeout for a single enqueue call.
    pub timeout: Duration,
    /// Capacity of the in-process queue.
    pub capacity: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout: Duration::from_secs(10),
            capacity: 1024,
        }
    }
}

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Pattern a worker id must match for non-ping tasks.
    pub worker_id_pattern: Regex,
    /// Allowed task names, in configuration order.
    pub task_names: Vec<String>,
    /// Value of `Access-Control-Allow-Origin`.
    pub cors_origin: String,
    /// Service name in `project:<service>:<task>` scopes.
    pub service_name: String,
    /// Listen address.
    pub bind_addr: SocketAddr,
    pub taskcluster: TaskclusterConfig,
    pub task_queue: TaskQueueConfig,
}

impl ControllerConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pattern = lookup("VALID_WORKER_ID_REGEX")
            .ok_or_else(|| ConfigError::MissingEnvVar("VALID_WORKER_ID_REGEX".into()))?;
        let worker_id_pattern = compile_worker_id_pattern(&pattern)?;

        let task_names = match lookup("TASK_NAMES") {
            Some(raw) => parse_task_names(&raw),
            None => DEFAULT_TASK_NAMES.iter().map(|s| s.to_string()).collect(),
        };
        if task_names.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "TASK_NAMES".into(),
                message: "at least one task name is required".into(),
            });
        }

        let cors_origin = lookup("CORS_ORIGIN")
            .ok_or_else(|| ConfigError::MissingEnvVar("CORS_ORIGIN".into()))?;
        if HeaderValue::from_str(&cors_origin).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "CORS_ORIGIN".into(),
                message: "not a valid header value".into(),
            });
        }

        let service_name =
            lookup("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "BIND_ADDR".into(),
                message: e.to_string(),
            })?;

        let taskcluster = TaskclusterConfig {
            root_url: lookup("TASKCLUSTER_ROOT_URL")
                .unwrap_or_else(|| "https://taskcluster.net".to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(parse_number(
                &lookup,
                "TASKCLUSTER_AUTH_TIMEOUT_SECS",
                10,
            )?),
        };

        let url = lookup("TASK_QUEUE_URL").filter(|s| !s.trim().is_empty());
        let in_process = parse_flag(&lookup, "TASK_QUEUE_IN_PROCESS")?;
        if url.is_none() && !in_process {
            return Err(ConfigError::MissingEnvVar("TASK_QUEUE_URL".into()));
        }

        let defaults = TaskQueueConfig::default();
        let capacity = parse_number(&lookup, "TASK_QUEUE_CAPACITY", defaults.capacity as u64)?;
        let capacity = usize::try_from(capacity)
            .ok()
            .filter(|c| (1..=MAX_QUEUE_CAPACITY).contains(c))
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "TASK_QUEUE_CAPACITY".into(),
                message: format!("must be between 1 and {}", MAX_QUEUE_CAPACITY),
            })?;

        let task_queue = TaskQueueConfig {
            url,
            token: lookup("TASK_QUEUE_TOKEN")
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            timeout: Duration::from_secs(parse_number(
                &lookup,
                "TASK_QUEUE_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
            capacity,
        };

        Ok(Self {
            worker_id_pattern,
            task_names,
            cors_origin,
            service_name,
            bind_addr,
            taskcluster,
            task_queue,
        })
    }
}

/// Compile a managed-host pattern anchored at the start of the worker id only.
pub fn compile_worker_id_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|e| ConfigError::InvalidValue {
        key: "VALID_WORKER_ID_REGEX".into(),
        message: e.to_string(),
    })
}

fn parse_task_names(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected true or false, got {:?}", v),
        }),
    }
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a non-negative integer, got {:?}", raw),
        }),
        None => Ok(default),
    }
}
