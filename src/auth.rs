//! Caller authentication against Taskcluster.
//!
//! Hawk verification is delegated to the Taskcluster auth service's
//! `authenticateHawk` endpoint, which replies with the caller's client id and
//! expanded scopes.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::admission::AuthenticatedCaller;
use crate::config::TaskclusterConfig;
use crate::error::AuthError;

/// Description of the inbound request the credential was issued for.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub method: String,
    /// Path and query string as sent by the client.
    pub resource: String,
    pub host: String,
    pub port: u16,
    pub authorization: Option<SecretString>,
}

/// Verifies credentials and reports who the caller is.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthenticatedCaller, AuthError>;
}

#[derive(Debug, Serialize)]
struct HawkRequest<'a> {
    method: String,
    resource: &'a str,
    host: &'a str,
    port: u16,
    authorization: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status")]
enum HawkResponse {
    #[serde(rename = "auth-success")]
    Success {
        #[serde(rename = "clientId")]
        client_id: String,
        #[serde(default)]
        scopes: Vec<String>,
    },
    #[serde(rename = "auth-failed")]
    Failed {
        #[serde(default)]
        message: String,
    },
    #[serde(rename = "no-auth")]
    NoAuth,
}

/// Authenticator backed by the Taskcluster auth service.
pub struct TaskclusterAuthenticator {
    client: reqwest::Client,
    endpoint: String,
}

impl TaskclusterAuthenticator {
    pub fn new(config: &TaskclusterConfig) -> Result<Self, AuthError> {
        Self::with_timeout(&config.root_url, config.timeout)
    }

    pub fn with_timeout(root_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Unavailable {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/api/auth/v1/authenticate-hawk",
                root_url.trim_end_matches('/')
            ),
        })
    }
}

#[async_trait]
impl Authenticator for TaskclusterAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthenticatedCaller, AuthError> {
        let authorization = request
            .authorization
            .as_ref()
            .ok_or(AuthError::MissingCredentials)?;

        let body = HawkRequest {
            method: request.method.to_lowercase(),
            resource: &request.resource,
            host: &request.host,
            port: request.port,
            authorization: authorization.expose_secret(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Taskcluster auth request failed");
                AuthError::Unavailable {
                    reason: e.to_string(),
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AuthError::Unavailable {
                reason: format!("auth service returned {}", status),
            });
        }

        let parsed: HawkResponse = resp.json().await.map_err(|e| AuthError::Unavailable {
            reason: format!("unreadable auth response: {}", e),
        })?;
        caller_from_response(parsed)
    }
}

fn caller_from_response(resp: HawkResponse) -> Result<AuthenticatedCaller, AuthError> {
    match resp {
        HawkResponse::Success { client_id, scopes } => {
            debug!(client_id = %client_id, scopes = scopes.len(), "Caller authenticated");
            Ok(AuthenticatedCaller::new(client_id, scopes))
        }
        HawkResponse::Failed { message } => Err(AuthError::Rejected { reason: message }),
        HawkResponse::NoAuth => Err(AuthError::MissingCredentials),
    }
}
