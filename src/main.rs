use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;

use relops_hardware_controller::admission::JobAdmissionHandler;
use relops_hardware_controller::auth::{Authenticator, TaskclusterAuthenticator};
use relops_hardware_controller::config::ControllerConfig;
use relops_hardware_controller::queue::{self, spawn_job_drain};
use relops_hardware_controller::routes::{AppState, queue_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ControllerConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  export VALID_WORKER_ID_REGEX=... CORS_ORIGIN=... TASK_QUEUE_URL=...");
        std::process::exit(1);
    });

    eprintln!("Relops hardware controller v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listen: http://{}", config.bind_addr);
    eprintln!("   Tasks: {}", config.task_names.join(", "));
    eprintln!("   CORS origin: {}", config.cors_origin);
    eprintln!("   Taskcluster: {}", config.taskcluster.root_url);
    match &config.task_queue.url {
        Some(url) => eprintln!("   Task queue: {}", url),
        None => eprintln!("   Task queue: IN-PROCESS (jobs are logged, nothing executes them)"),
    }

    // ── Task queue ──────────────────────────────────────────────────────
    let (task_queue, local_rx) =
        queue::create_queue(&config.task_queue).context("failed to create task queue")?;
    let _drain_handle = local_rx.map(spawn_job_drain);

    // ── Admission ───────────────────────────────────────────────────────
    let authenticator: Arc<dyn Authenticator> = Arc::new(
        TaskclusterAuthenticator::new(&config.taskcluster)
            .context("failed to create Taskcluster authenticator")?,
    );
    let handler = Arc::new(JobAdmissionHandler::from_config(&config, task_queue));

    let state = AppState {
        handler,
        authenticator,
        service_name: config.service_name.clone(),
    };
    let cors_origin =
        HeaderValue::from_str(&config.cors_origin).context("invalid CORS origin")?;
    let app = queue_routes(state, cors_origin);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Hardware controller listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
