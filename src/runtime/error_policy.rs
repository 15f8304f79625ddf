//! # Error Policy
//!
//! Requeue delay for failed reconciliation attempts.

use crate::controller::reconciler::{resource_key, ReconcileError, Reconciler, TriggerSource};
use crate::crd::CertificateSet;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource so one failing CertificateSet does not
/// slow down the others; a successful attempt resets it.
pub fn error_policy<S>(cs: Arc<CertificateSet>, error: &ReconcileError, ctx: Arc<Reconciler<S>>) -> Action {
    let key = resource_key(&cs);

    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.reconciliation_error",
        resource.key = %key,
        reason = error.reason(),
    );
    let _error_guard = error_span.enter();

    warn!("Reconciliation failed: {}", error);
    observability::metrics::increment_reconciliation_errors(error.reason());

    let (delay, error_count) = ctx.next_error_backoff(&key);
    #[allow(clippy::cast_possible_wrap, reason = "Backoff is capped at minutes")]
    let next_trigger_time = chrono::Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);
    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {}, next attempt at {}, trigger source: {})",
        delay.as_secs(),
        error_count,
        next_trigger_time.to_rfc3339(),
        TriggerSource::ErrorBackoff.as_str()
    );

    observability::metrics::increment_requeues(TriggerSource::ErrorBackoff.as_str());
    Action::requeue(delay)
}
