//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `certificate_set_reconciliations_total` - Total number of reconciliation attempts
//! - `certificate_set_reconciliation_errors_total` - Failed attempts by condition reason
//! - `certificate_set_reconciliation_duration_seconds` - Duration of reconciliation attempts
//! - `certificate_set_requeues_total` - Requeues by trigger source
//! - `certificate_set_children_created_total` - Child resources created by kind
//! - `certificate_set_converged` - CertificateSets currently Ready

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::collections::HashSet;
use std::sync::{LazyLock, Mutex, PoisonError};

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "certificate_set_reconciliations_total",
        "Total number of reconciliation attempts",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "certificate_set_reconciliation_errors_total",
            "Total number of failed reconciliation attempts by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "certificate_set_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "certificate_set_requeues_total",
            "Total number of requeues by trigger source",
        ),
        &["trigger"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static CHILDREN_CREATED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "certificate_set_children_created_total",
            "Total number of child resources created by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create CHILDREN_CREATED_TOTAL metric - this should never happen")
});

static CONVERGED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "certificate_set_converged",
        "Current number of CertificateSets with Ready=True",
    )
    .expect("Failed to create CONVERGED metric - this should never happen")
});

static CONVERGED_SETS: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHILDREN_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONVERGED.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(reason: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[reason])
        .inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues(trigger: &str) {
    REQUEUES_TOTAL.with_label_values(&[trigger]).inc();
}

pub fn increment_children_created(kind: &str) {
    CHILDREN_CREATED_TOTAL.with_label_values(&[kind]).inc();
}

/// Track whether the CertificateSet `key` (`namespace/name`) is converged
pub fn set_converged(key: &str, converged: bool) {
    let mut sets = CONVERGED_SETS.lock().unwrap_or_else(PoisonError::into_inner);
    if converged {
        sets.insert(key.to_string());
    } else {
        sets.remove(key);
    }
    #[allow(clippy::cast_possible_wrap, reason = "Set count never exceeds i64::MAX")]
    CONVERGED.set(sets.len() as i64);
}
