//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `cfapi_reconciliations_total` - Total number of reconciliations
//! - `cfapi_reconciliation_errors_total{error}` - Reconciliation errors by error kind
//! - `cfapi_reconciliation_duration_seconds` - Duration of reconcile passes
//! - `cfapi_chart_operations_total{operation,result}` - Chart install/uninstall calls

use crate::error::ControllerError;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("cfapi_reconciliations_total", "Total number of reconciliations")
        .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cfapi_reconciliation_errors_total",
            "Total number of reconciliation errors by error kind",
        ),
        &["error"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "cfapi_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static CHART_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cfapi_chart_operations_total",
            "Total number of chart operations by operation and result",
        ),
        &["operation", "result"],
    )
    .expect("Failed to create CHART_OPERATIONS_TOTAL metric - this should never happen")
});

/// Register every controller metric with `REGISTRY`. Call once at startup.
pub fn register_metrics() -> Result<(), ControllerError> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CHART_OPERATIONS_TOTAL.clone()))?;
    Ok(())
}

/// Count a reconcile pass.
pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

/// Count a failed pass under its error label.
pub fn increment_reconciliation_errors(error: &ControllerError) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[error.metric_label()])
        .inc();
}

/// Record how long a pass took.
pub fn observe_reconciliation_duration(seconds: f64) {
    RECONCILIATION_DURATION.observe(seconds);
}

/// Count a chart install or uninstall by outcome.
pub fn record_chart_operation(operation: &str, success: bool) {
    let result = if success { "success" } else { "error" };
    CHART_OPERATIONS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
}
