//! CFAPI Controller
//!
//! Installs the CF API workload chart for every `CFAPI` resource and tears it
//! down again before the resource is deleted:
//! - creation adds a finalizer, then installs the chart (`Processing` -> `Ready`)
//! - spec updates re-install the chart for the new generation
//! - failed installs end in `Error` and are retried with rate-limited backoff
//! - deletion uninstalls the chart, then releases the finalizer

mod config;
mod controller;
mod error;
mod events;
mod finalizer;
mod metrics;
mod rate_limiter;
mod reconciler;
mod server;
mod store;
#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::KubeEventRecorder;
use crate::rate_limiter::RateLimiter;
use crate::reconciler::{Reconciler, ReconcilerOptions, TerminalStates};
use crate::server::{Readiness, start_server};
use crate::store::KubeStateStore;
use chart_client::HelmClient;
use crds::{CFAPI, State};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| ControllerError::InvalidConfig("Failed to install rustls crypto provider".to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cfapi_controller=info,chart_client=info".into()),
        )
        .init();

    info!("Starting CFAPI Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Chart: {}", config.chart);
    info!("  Helm timeout: {:?}", config.helm_timeout);
    info!("  Max concurrent reconciles: {}", config.max_concurrent_reconciles);

    metrics::register_metrics()?;

    let readiness = Arc::new(Readiness::default());
    let server_port = config.metrics_port;
    let server_readiness = readiness.clone();
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_readiness).await {
            error!("HTTP server error: {}", e);
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received, cancelling in-flight reconciles");
        let _ = shutdown_tx.send(true);
    });

    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limiter.clone()));
    let gc_limiter = rate_limiter.clone();
    let entry_ttl = config.rate_limiter_entry_ttl;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(entry_ttl);
        loop {
            interval.tick().await;
            let dropped = gc_limiter.gc(entry_ttl);
            if dropped > 0 {
                info!(
                    "Dropped {} idle rate limiter entries ({} remaining)",
                    dropped,
                    gc_limiter.len()
                );
            }
        }
    });

    let client = Client::try_default().await?;
    let api: Api<CFAPI> = match config.namespace.as_deref() {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let helm = HelmClient::new(config.helm_binary.clone());
    info!("Using helm binary {}", helm.binary());

    let options = ReconcilerOptions {
        terminal_states: TerminalStates::new(State::Ready, State::Deleting)?,
        chart: config.chart.clone(),
        helm_timeout: Some(config.helm_timeout),
        conflict_retries: config.conflict_retries,
        ..ReconcilerOptions::default()
    };
    let reconciler = Arc::new(Reconciler::new(
        Box::new(KubeStateStore::new(client.clone())),
        Box::new(helm),
        Box::new(KubeEventRecorder::new(client)),
        rate_limiter,
        options,
        shutdown_rx,
    ));

    controller::run(api, reconciler, config.max_concurrent_reconciles, readiness).await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!("Failed to listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
