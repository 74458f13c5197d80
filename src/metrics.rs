//! Prometheus metrics for ticketd.
//!
//! Exposed on the optional `/metrics` endpoint (see [`crate::http`]).
//!
//! - `ticket_operations_total{op}` - Lifecycle and panel operations completed
//! - `ticket_operation_errors_total{op,error}` - Failed operations by error code
//! - `ticket_operation_duration_seconds{op}` - Operation latency, platform calls included
//! - `ticket_rollbacks_total` - Ticket rows removed after a provisioning failure
//! - `ticket_side_effect_failures_total{step}` - Post-commit platform effects that failed
//! - `ticket_interactions_total{kind}` - Gateway interactions received

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Operations completed by name.
pub static OPERATIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Operation failures by name and error code.
pub static OPERATION_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Ticket rows deleted to undo a failed provisioning.
pub static ROLLBACKS: OnceLock<IntCounter> = OnceLock::new();

/// Best-effort platform effects that failed after the state change committed.
pub static SIDE_EFFECT_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Interactions received from the gateway by kind.
pub static INTERACTIONS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Operation latency by name.
pub static OPERATION_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Called once at startup before any metrics are recorded. Recording before
/// (or without) initialization is a no-op.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(OPERATIONS, IntCounterVec::new(Opts::new("ticket_operations_total", "Ticket and panel operations completed"), &["op"]));
    register!(OPERATION_ERRORS, IntCounterVec::new(Opts::new("ticket_operation_errors_total", "Ticket and panel operation failures"), &["op", "error"]));
    register!(ROLLBACKS, IntCounter::new("ticket_rollbacks_total", "Ticket rows removed after a provisioning failure"));
    register!(SIDE_EFFECT_FAILURES, IntCounterVec::new(Opts::new("ticket_side_effect_failures_total", "Post-commit platform effects that failed"), &["step"]));
    register!(INTERACTIONS, IntCounterVec::new(Opts::new("ticket_interactions_total", "Gateway interactions received"), &["kind"]));
    register!(OPERATION_LATENCY, HistogramVec::new(
        HistogramOpts::new("ticket_operation_duration_seconds", "Ticket operation latency")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["op"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers
// ============================================================================

/// Record a completed operation with latency.
#[inline]
pub fn record_operation(op: &str, duration_secs: f64) {
    if let Some(c) = OPERATIONS.get() {
        c.with_label_values(&[op]).inc();
    }
    if let Some(h) = OPERATION_LATENCY.get() {
        h.with_label_values(&[op]).observe(duration_secs);
    }
}

#[inline]
pub fn record_operation_error(op: &str, error: &str) {
    if let Some(c) = OPERATION_ERRORS.get() {
        c.with_label_values(&[op, error]).inc();
    }
}

#[inline]
pub fn record_rollback() {
    if let Some(c) = ROLLBACKS.get() {
        c.inc();
    }
}

#[inline]
pub fn record_side_effect_failure(step: &str) {
    if let Some(c) = SIDE_EFFECT_FAILURES.get() {
        c.with_label_values(&[step]).inc();
    }
}

#[inline]
pub fn record_interaction(kind: &str) {
    if let Some(c) = INTERACTIONS.get() {
        c.with_label_values(&[kind]).inc();
    }
}
