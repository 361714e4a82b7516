//! Integration tests for the job submission HTTP surface.
//!
//! Each test spins up an Axum server on a random port with a stub
//! authenticator and the in-process queue, then talks to it with reqwest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderValue;
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use relops_hardware_controller::admission::{AuthenticatedCaller, JobAdmissionHandler};
use relops_hardware_controller::auth::{AuthRequest, Authenticator};
use relops_hardware_controller::config::ControllerConfig;
use relops_hardware_controller::error::AuthError;
use relops_hardware_controller::queue::{InMemoryTaskQueue, QueuedJob};
use relops_hardware_controller::routes::{AppState, queue_routes};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const REBOOT_SCOPE: &str = "project:relops-hardware-controller:reboot";
const PING_SCOPE: &str = "project:relops-hardware-controller:ping";

/// Authenticator that maps an authorization header value to a fixed caller.
struct StubAuthenticator {
    callers: HashMap<String, AuthenticatedCaller>,
}

impl StubAuthenticator {
    fn new() -> Self {
        let mut callers = HashMap::new();
        callers.insert(
            "Hawk id=\"rebooter\"".to_string(),
            AuthenticatedCaller::new("rebooter", vec![REBOOT_SCOPE.to_string()]),
        );
        callers.insert(
            "Hawk id=\"pinger\"".to_string(),
            AuthenticatedCaller::new("pinger", vec![PING_SCOPE.to_string()]),
        );
        callers.insert(
            "Hawk id=\"nobody\"".to_string(),
            AuthenticatedCaller::new("nobody", vec![]),
        );
        Self { callers }
    }
}

#[async_trait]
impl Authenticator for StubAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthenticatedCaller, AuthError> {
        let header = request
            .authorization
            .as_ref()
            .ok_or(AuthError::MissingCredentials)?;
        self.callers
            .get(header.expose_secret())
            .cloned()
            .ok_or_else(|| AuthError::Rejected {
                reason: "unknown credentials".into(),
            })
    }
}

fn test_config() -> ControllerConfig {
    ControllerConfig::from_lookup(|key| match key {
        "VALID_WORKER_ID_REGEX" => Some(r"t-yosemite-r7-\d+".to_string()),
        "CORS_ORIGIN" => Some("https://tools.taskcluster.net".to_string()),
        "TASK_QUEUE_IN_PROCESS" => Some("true".to_string()),
        _ => None,
    })
    .expect("test config")
}

/// Start a server on a random port, return (base url, queue receiver).
async fn start_server() -> (String, mpsc::Receiver<QueuedJob>) {
    let config = test_config();
    let (queue, rx) = InMemoryTaskQueue::new(16);
    let handler = Arc::new(JobAdmissionHandler::from_config(&config, Arc::new(queue)));
    let state = AppState {
        handler,
        authenticator: Arc::new(StubAuthenticator::new()),
        service_name: config.service_name.clone(),
    };
    let app = queue_routes(state, HeaderValue::from_str(&config.cors_origin).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{port}"), rx)
}

async fn post_job(base: &str, worker_id: &str, query: &str, auth: Option<&str>) -> reqwest::Response {
    let mut req = reqwest::Client::new()
        .post(format!("{base}/queue/{worker_id}?{query}"))
        .header("origin", "https://tools.taskcluster.net");
    if let Some(auth) = auth {
        req = req.header("authorization", auth);
    }
    req.send().await.unwrap()
}

#[tokio::test]
async fn authorized_reboot_returns_created_job() {
    timeout(TEST_TIMEOUT, async {
        let (base, mut rx) = start_server().await;

        let resp = post_job(
            &base,
            "T-Yosemite-R7-380",
            "task_name=reboot&provisioner_id=releng-hardware&worker_type=gecko-t-osx-1010",
            Some("Hawk id=\"rebooter\""),
        )
        .await;

        assert_eq!(resp.status(), 201);
        assert_eq!(
            resp.headers()["access-control-allow-origin"],
            "https://tools.taskcluster.net"
        );
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["worker_id"], "t-yosemite-r7-380");
        assert_eq!(json["worker_group"], "none");
        assert_eq!(json["client_id"], "rebooter");
        assert_eq!(json["task_name"], "reboot");
        assert_eq!(json["provisioner_id"], "releng-hardware");
        assert_eq!(json["worker_type"], "gecko-t-osx-1010");
        assert_eq!(json["http_origin"], "https://tools.taskcluster.net");
        let task_id = json["task_id"].as_str().unwrap();
        assert!(!task_id.is_empty());

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.id, task_id);
        assert_eq!(queued.payload.job.worker_id, "t-yosemite-r7-380");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn same_request_twice_yields_distinct_task_ids() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;

        let mut ids = Vec::new();
        for _ in 0..2 {
            let resp = post_job(
                &base,
                "t-yosemite-r7-380",
                "task_name=reboot",
                Some("Hawk id=\"rebooter\""),
            )
            .await;
            assert_eq!(resp.status(), 201);
            let json: Value = resp.json().await.unwrap();
            ids.push(json["task_id"].as_str().unwrap().to_string());
        }
        assert_ne!(ids[0], ids[1]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_task_name_is_bad_request() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;

        // Caller has no scopes: validation must still win over authorization.
        let resp = post_job(
            &base,
            "t-yosemite-r7-380",
            "task_name=reimage",
            Some("Hawk id=\"nobody\""),
        )
        .await;

        assert_eq!(resp.status(), 400);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["task_name"][0], "\"reimage\" is not a valid choice.");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_task_name_is_bad_request() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;

        let resp = post_job(&base, "t-yosemite-r7-380", "", Some("Hawk id=\"rebooter\"")).await;

        assert_eq!(resp.status(), 400);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["task_name"][0], "This field is required.");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn duplicate_query_key_needs_credentials_first() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;
        let query = "task_name=reboot&task_name=ping";

        let anonymous = post_job(&base, "t-yosemite-r7-380", query, None).await;
        assert_eq!(anonymous.status(), 401);

        let rejected = post_job(&base, "t-yosemite-r7-380", query, Some("Hawk id=\"stranger\"")).await;
        assert_eq!(rejected.status(), 401);

        let authed = post_job(&base, "t-yosemite-r7-380", query, Some("Hawk id=\"rebooter\"")).await;
        assert_eq!(authed.status(), 400);
        assert!(
            authed.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("application/json")
        );
        let json: Value = authed.json().await.unwrap();
        assert!(json["non_field_errors"][0].is_string());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unmanaged_host_is_not_found() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;

        let resp = post_job(
            &base,
            "UNKNOWN-HOST",
            "task_name=reboot",
            Some("Hawk id=\"rebooter\""),
        )
        .await;

        assert_eq!(resp.status(), 404);
        assert_eq!(resp.text().await.unwrap(), "Not a managed host.");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ping_skips_host_check_but_needs_scope() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;

        let denied = post_job(&base, "abc123", "task_name=ping", Some("Hawk id=\"nobody\"")).await;
        assert_eq!(denied.status(), 403);

        let allowed = post_job(&base, "abc123", "task_name=ping", Some("Hawk id=\"pinger\"")).await;
        assert_eq!(allowed.status(), 201);
        let json: Value = allowed.json().await.unwrap();
        assert_eq!(json["worker_id"], "abc123");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn wrong_scope_is_forbidden() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;

        let resp = post_job(
            &base,
            "t-yosemite-r7-380",
            "task_name=reboot",
            Some("Hawk id=\"pinger\""),
        )
        .await;

        assert_eq!(resp.status(), 403);
        let json: Value = resp.json().await.unwrap();
        assert!(json["detail"].is_string());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_or_bad_credentials_are_unauthorized() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;

        let missing = post_job(&base, "t-yosemite-r7-380", "task_name=reboot", None).await;
        assert_eq!(missing.status(), 401);

        let bad = post_job(
            &base,
            "t-yosemite-r7-380",
            "task_name=reboot",
            Some("Hawk id=\"stranger\""),
        )
        .await;
        assert_eq!(bad.status(), 401);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn options_returns_ok_with_cors_header() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;

        let plain = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("{base}/queue/t-yosemite-r7-380"))
            .send()
            .await
            .unwrap();
        assert_eq!(plain.status(), 200);
        assert_eq!(
            plain.headers()["access-control-allow-origin"],
            "https://tools.taskcluster.net"
        );
        assert!(plain.text().await.unwrap().is_empty());

        let preflight = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("{base}/queue/t-yosemite-r7-380"))
            .header("origin", "https://tools.taskcluster.net")
            .header("access-control-request-method", "POST")
            .send()
            .await
            .unwrap();
        assert_eq!(preflight.status(), 200);
        assert_eq!(
            preflight.headers()["access-control-allow-origin"],
            "https://tools.taskcluster.net"
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;

        let client = reqwest::Client::new();
        let get = client
            .get(format!("{base}/queue/t-yosemite-r7-380"))
            .send()
            .await
            .unwrap();
        assert_eq!(get.status(), 405);

        let delete = client
            .delete(format!("{base}/queue/t-yosemite-r7-380"))
            .send()
            .await
            .unwrap();
        assert_eq!(delete.status(), 405);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn health_reports_service_name() {
    timeout(TEST_TIMEOUT, async {
        let (base, _rx) = start_server().await;

        let json: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "relops-hardware-controller");
    })
    .await
    .expect("test timed out");
}
