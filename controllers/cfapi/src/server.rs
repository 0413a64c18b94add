//! # Probe and metrics server
//!
//! - `GET /metrics` scrapes the controller registry
//! - `GET /healthz` answers as long as the process serves HTTP
//! - `GET /readyz` answers 200 only while the controller stream is running
//!
//! Readiness is driven by `controller::run`, which flips it when the watch
//! starts and again when the stream ends on shutdown.

use crate::error::ControllerError;
use crate::metrics::REGISTRY;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Readiness of the controller, shared between the runner and `/readyz`
#[derive(Debug, Default)]
pub struct Readiness {
    running: AtomicBool,
}

impl Readiness {
    /// Controller stream started.
    pub fn controller_started(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Controller stream ended.
    pub fn controller_stopped(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether reconciles are currently being processed.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Routes served on the metrics port.
pub fn router(readiness: Arc<Readiness>) -> Router {
    Router::new()
        .route("/metrics", get(scrape))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

/// Serve probes and metrics on `0.0.0.0:port` until the process exits.
pub async fn start_server(port: u16, readiness: Arc<Readiness>) -> Result<(), ControllerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Serving /metrics, /healthz and /readyz on {}", addr);
    axum::serve(listener, router(readiness)).await?;
    Ok(())
}

async fn scrape() -> Response {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    match encoder.encode(&REGISTRY.gather(), &mut body) {
        Ok(()) => ([(header::CONTENT_TYPE, encoder.format_type().to_string())], body).into_response(),
        Err(e) => {
            warn!("Metrics scrape failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn readyz(State(readiness): State<Arc<Readiness>>) -> (StatusCode, &'static str) {
    if readiness.is_running() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "controller not running")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_readyz_tracks_controller_lifecycle() {
        let readiness = Arc::new(Readiness::default());
        assert_eq!(readyz(State(readiness.clone())).await.0, StatusCode::SERVICE_UNAVAILABLE);

        readiness.controller_started();
        assert_eq!(readyz(State(readiness.clone())).await.0, StatusCode::OK);

        readiness.controller_stopped();
        assert_eq!(readyz(State(readiness)).await.0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_scrape_uses_prometheus_text_format() {
        crate::metrics::increment_reconciliations();
        let response = scrape().await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"), "{content_type}");
    }
}
