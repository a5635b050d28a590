//! Bolt Controller
//!
//! Runs the Task and RecurringTask controllers against the configured
//! cluster until interrupted.

use anyhow::{Context as _, Result};
use bolt_client::{Api, Client, ListParams};
use bolt_core::PlanCompiler;
use bolt_core::domain::task::Task;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bolt_controller::api::{self, AppState};
use bolt_controller::config::Config;
use bolt_controller::controller::{Context, RecurringTaskController, TaskController};
use bolt_controller::manager::{Manager, ManagerSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bolt_controller=info,bolt_client=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Bolt Controller");

    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: namespace={}, executor_image={}",
        config.namespace, config.compiler.executor_image
    );

    let client = if config.uses_memory_cluster() {
        warn!("CLUSTER_URL is not set, running against an in-memory cluster");
        Client::memory()
    } else {
        info!("Using cluster at {}", config.cluster_url);
        Client::http(config.cluster_url.clone(), config.cluster_token.clone())
    };

    let cancel = CancellationToken::new();
    let state = AppState::new();

    // Probes come up before the cluster is reachable so liveness passes
    let health = tokio::spawn(serve_health(
        config.health_bind_addr.clone(),
        state.clone(),
        cancel.clone(),
    ));

    connect_with_retry(&client, &config.namespace).await?;
    info!("Connected to cluster");

    let context = Context::new(client, PlanCompiler::new(config.compiler.clone()), &config.namespace);
    let settings = ManagerSettings::from(&config);
    let tasks = Manager::new(TaskController::new(&context), &context, settings.clone());
    let recurring_tasks = Manager::new(RecurringTaskController::new(&context), &context, settings);

    tokio::spawn(shutdown_on_signal(cancel.clone()));

    state.set_ready(true);
    info!("Controllers initialized");

    tokio::join!(tasks.run(cancel.clone()), recurring_tasks.run(cancel.clone()));
    state.set_ready(false);

    match health.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Health server error: {:#}", e),
        Err(e) => error!("Health server task failed: {}", e),
    }

    info!("Bolt Controller stopped");
    Ok(())
}

async fn serve_health(addr: String, state: AppState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind health endpoints to {}", addr))?;
    info!("Health endpoints listening on {}", addr);

    axum::serve(listener, api::create_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("Health server failed")
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
    cancel.cancel();
}

/// Checks that the cluster answers, with exponential backoff
///
/// The API server may not be reachable yet when the controller starts
/// (common in container environments).
async fn connect_with_retry(client: &Client, namespace: &str) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let tasks: Api<Task> = Api::namespaced(client.clone(), namespace);
    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match tasks.list(&ListParams::default()).await {
            Ok(existing) => {
                info!(
                    "Found {} task(s) in namespace {} after {} attempt(s)",
                    existing.len(),
                    namespace,
                    attempt
                );
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to reach cluster after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Failed to reach cluster: {}", e));
                }

                warn!(
                    "Failed to reach cluster (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
