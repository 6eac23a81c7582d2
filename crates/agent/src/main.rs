//! Add-on Agent - deployment orchestration service
//!
//! Serves the deployment API, cluster analysis, health probes and
//! Prometheus metrics.

use addon_agent::{api, config};
use addon_engine::{
    health::{Component, HealthRegistry},
    ArtifactHubClient, DeploymentLogger, DeploymentService, EngineMetrics, HelmDriver,
    KubeConnector, PackageManager,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting addon-agent");

    let config = config::AgentConfig::load()?;
    info!(
        registry_url = %config.registry_url,
        max_candidates = config.max_candidates,
        "Agent configured"
    );

    let health_registry = HealthRegistry::with_all_components().await;
    health_registry
        .mark_degraded(Component::PackageManager, "Not yet verified")
        .await;

    let metrics = EngineMetrics::new();
    let logger = DeploymentLogger::new("agent");

    let registry = Arc::new(ArtifactHubClient::new(
        &config.registry_url,
        config.search_timeout(),
    )?);
    let driver = Arc::new(HelmDriver::new(config.helm_config()));
    let service = Arc::new(DeploymentService::new(
        Arc::new(KubeConnector::new()),
        registry,
        driver.clone(),
        config.service_config(),
    ));

    // Verify or bootstrap helm without holding up startup
    let bootstrap_health = health_registry.clone();
    tokio::spawn(async move {
        let result = driver.ensure_installed().await;
        if let Err(e) = &result {
            error!(error = %e, "Package manager bootstrap failed");
        }
        bootstrap_health
            .observe(Component::PackageManager, &result)
            .await;
    });

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        service.clone(),
    ));

    let listen_addr = format!("0.0.0.0:{}", config.api_port);
    logger.log_startup(AGENT_VERSION, &listen_addr);

    health_registry.set_ready(true).await;

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = shutdown_rx.recv().await;
    }));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    health_registry.set_ready(false).await;
    service.shutdown();
    let _ = shutdown_tx.send(());

    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server exited with error"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }

    Ok(())
}
