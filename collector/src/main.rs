use anyhow::Context;
use axum::{routing::get, Router};
use collector::config::Config;
use collector::model::TriggerEvent;
use collector::scheduler::{self, RunStatus};
use collector::{metrics, pipeline, rest};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CLI_SOURCE: &str = "cli";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Read once. The scheduler reuses these values for every run.
    let config = Config::from_env();

    info!("Starting thermostat collector");
    info!("Token endpoint: {}", config.token_url);
    info!("Devices endpoint: {}", config.devices_url);
    info!(
        "Store endpoint: {} (discovery={}, region={})",
        config.store_url, config.endpoint_discovery, config.aws_region
    );
    info!(
        "Destination: {}.{}",
        config.database.as_deref().unwrap_or("<unset>"),
        config.table.as_deref().unwrap_or("<unset>")
    );

    if config.run_once {
        let report = pipeline::run(&config, &TriggerEvent::new(CLI_SOURCE)).await?;
        println!("{}", report.source);
        return Ok(());
    }

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
    }

    // Capacity 1: at most one manual run waits behind the active one.
    let (tx, rx) = mpsc::channel(1);
    let status = RunStatus::default();

    let scheduler_config = Arc::new(config.clone());
    let scheduler_status = status.clone();
    let period = config.run_interval;
    let scheduler_handle = tokio::spawn(async move {
        scheduler::run_scheduler(scheduler_config, rx, scheduler_status, period).await;
    });

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .merge(rest::create_router(status, tx));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = scheduler_handle => {
            error!("Scheduler terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
