//! # Metrics
//!
//! Prometheus metrics for reconciliation passes and provider calls.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;

/// Global Prometheus metrics registry
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "droplet_operator_reconciliations_total",
            "Total number of reconciliation passes",
        ),
        &["kind", "result"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "droplet_operator_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static PROVIDER_CALLS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "droplet_operator_provider_calls_total",
            "Total number of DigitalOcean API calls issued by reconcilers",
        ),
        &["operation", "result"],
    )
    .expect("Failed to create PROVIDER_CALLS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "droplet_operator_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["kind", "reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register all metrics with the registry
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let collectors: [Box<dyn prometheus::core::Collector>; 4] = [
        Box::new(RECONCILIATIONS_TOTAL.clone()),
        Box::new(RECONCILIATION_DURATION.clone()),
        Box::new(PROVIDER_CALLS_TOTAL.clone()),
        Box::new(REQUEUES_TOTAL.clone()),
    ];
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Render the registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub fn record_reconciliation(kind: &str, success: bool, duration_secs: f64) {
    let result = if success { "success" } else { "error" };
    RECONCILIATIONS_TOTAL.with_label_values(&[kind, result]).inc();
    RECONCILIATION_DURATION.with_label_values(&[kind]).observe(duration_secs);
}

pub fn record_provider_call(operation: &str, success: bool) {
    let result = if success { "success" } else { "error" };
    PROVIDER_CALLS_TOTAL.with_label_values(&[operation, result]).inc();
}

pub fn increment_requeues(kind: &str, reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[kind, reason]).inc();
}
