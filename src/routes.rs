//! HTTP routes for job submission.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{OriginalUri, Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, options},
};
use secrecy::SecretString;
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, warn};

use crate::admission::{JobAdmissionHandler, RawJobFields};
use crate::auth::{AuthRequest, Authenticator};
use crate::error::{AdmissionError, AuthError, FieldErrors};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<JobAdmissionHandler>,
    pub authenticator: Arc<dyn Authenticator>,
    /// Reported by the health endpoint.
    pub service_name: String,
}

/// Build the router with the queue and health routes.
pub fn queue_routes(state: AppState, cors_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(cors_origin))
        .allow_methods([Method::OPTIONS, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/queue/{worker_id}",
            options(queue_job_options).post(queue_job_create).layer(cors),
        )
        .route("/health", get(health))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.service_name,
    }))
}

// ── Queue ───────────────────────────────────────────────────────────────

/// Query string of a job submission.
#[derive(Debug, Default, Deserialize)]
struct JobQuery {
    task_name: Option<String>,
    provisioner_id: Option<String>,
    worker_type: Option<String>,
    worker_group: Option<String>,
}

async fn queue_job_options(Path(_worker_id): Path<String>) -> StatusCode {
    StatusCode::OK
}

async fn queue_job_create(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    query: Result<Query<JobQuery>, QueryRejection>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    let resource = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let auth_request = auth_request_from(&method, resource, &headers);

    let caller = match state.authenticator.authenticate(&auth_request).await {
        Ok(caller) => caller,
        Err(e) => {
            warn!(error = %e, worker_id = %worker_id, "Authentication failed");
            return e.into_response();
        }
    };

    // Query errors are reported to authenticated callers only.
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            let mut errors = FieldErrors::new();
            errors.add("non_field_errors", rejection.body_text());
            warn!(client_id = %caller.client_id, errors = %errors, "Malformed query string");
            return AdmissionError::Validation(errors).into_response();
        }
    };

    let raw = RawJobFields {
        worker_id: Some(worker_id),
        worker_group: query.worker_group,
        task_name: query.task_name,
        provisioner_id: query.provisioner_id,
        worker_type: query.worker_type,
        http_origin: header_str(&headers, header::ORIGIN.as_str()),
    };

    match state.handler.submit(raw, &caller).await {
        Ok(job) => (StatusCode::CREATED, Json(job)).into_response(),
        Err(e) => e.into_response(),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Describe the inbound request for credential verification.
///
/// Host and port come from the `Host` header; without an explicit port the
/// forwarded scheme decides between 443 and 80.
fn auth_request_from(method: &Method, resource: String, headers: &HeaderMap) -> AuthRequest {
    let host_header = header_str(headers, header::HOST.as_str()).unwrap_or_default();
    let (host, explicit_port) = match host_header.rsplit_once(':') {
        Some((h, p)) => match p.parse::<u16>() {
            Ok(port) => (h.to_string(), Some(port)),
            Err(_) => (host_header.clone(), None),
        },
        _ => (host_header.clone(), None),
    };

    let port = explicit_port
        .or_else(|| header_str(headers, "x-forwarded-port").and_then(|p| p.parse().ok()))
        .unwrap_or_else(|| {
            match header_str(headers, "x-forwarded-proto").as_deref() {
                Some("https") => 443,
                _ => 80,
            }
        });

    let authorization = header_str(headers, header::AUTHORIZATION.as_str())
        .filter(|v| !v.is_empty())
        .map(SecretString::from);

    debug!(host = %host, port, resource = %resource, "Built auth request");

    AuthRequest {
        method: method.as_str().to_string(),
        resource,
        host,
        port,
        authorization,
    }
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "detail": message.into() })),
    )
        .into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut resp = match &self {
            AuthError::MissingCredentials => detail(
                StatusCode::UNAUTHORIZED,
                "Authentication credentials were not provided.",
            ),
            AuthError::Rejected { reason } => detail(StatusCode::UNAUTHORIZED, reason.clone()),
            AuthError::Unavailable { .. } => detail(
                StatusCode::BAD_GATEWAY,
                "Authentication service unavailable.",
            ),
        };
        if resp.status() == StatusCode::UNAUTHORIZED {
            resp.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Hawk"));
        }
        resp
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        match self {
            AdmissionError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(errors)).into_response()
            }
            AdmissionError::UnrecognizedHost { .. } => {
                (StatusCode::NOT_FOUND, "Not a managed host.").into_response()
            }
            AdmissionError::Unauthorized { .. } => detail(
                StatusCode::FORBIDDEN,
                "You do not have permission to perform this action.",
            ),
            AdmissionError::Submission(_) => {
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to queue task.")
            }
        }
    }
}
