//! # Types
//!
//! Core types for the reconciler.

use super::status::reasons;
use crate::config::ControllerConfig;
use crate::constants::{
    DEFAULT_ARGOCD_NAMESPACE, DEFAULT_ERROR_BACKOFF_MAX_MINUTES, DEFAULT_ERROR_BACKOFF_MIN_MINUTES,
    DEFAULT_RECONCILE_TIMEOUT_SECS, DEFAULT_REQUEUE_AFTER_SECS,
};
use crate::controller::backoff::BackoffState;
use crate::controller::builders::BuildError;
use crate::store::StoreError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// A failed reconciliation attempt, one variant per failing phase
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("CertificateSet has no namespace")]
    MissingNamespace,
    #[error("failed to attach finalizer: {0}")]
    Finalizer(#[source] StoreError),
    #[error("failed to clean up before deletion: {0}")]
    Cleanup(#[source] StoreError),
    #[error("failed to create CA certificates: {0}")]
    CaCertificates(#[source] StoreError),
    #[error("failed to create client certificates: {0}")]
    ClientCertificates(#[source] StoreError),
    #[error("failed to render derived secret: {0}")]
    Render(#[source] BuildError),
    #[error("failed to create derived secrets: {0}")]
    DerivedSecrets(#[source] StoreError),
    #[error("ArgoCD namespace {0} does not exist")]
    ArgoCdNamespaceNotFound(String),
    #[error("Secret {secret} is registered by CertificateSet {owner}")]
    RegistrationConflict { secret: String, owner: String },
    #[error("failed to delete ArgoCD cluster secret: {0}")]
    ArgoCdCleanup(#[source] StoreError),
    #[error("failed to check resource readiness: {0}")]
    ReadinessCheck(#[source] StoreError),
    #[error("failed to update status: {0}")]
    Status(#[source] StoreError),
    #[error("reconciliation did not finish within {0:?}")]
    Timeout(Duration),
}

impl ReconcileError {
    /// Machine-readable reason recorded on the status conditions
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::MissingNamespace => reasons::INVALID_RESOURCE,
            ReconcileError::Finalizer(_) => reasons::FINALIZER_FAILED,
            ReconcileError::Cleanup(_) => reasons::CLEANUP_FAILED,
            ReconcileError::CaCertificates(_) => reasons::CA_CERTIFICATES_FAILED,
            ReconcileError::ClientCertificates(_) => reasons::CLIENT_CERTIFICATES_FAILED,
            ReconcileError::Render(_) | ReconcileError::DerivedSecrets(_) => {
                reasons::DERIVED_SECRETS_FAILED
            }
            ReconcileError::ArgoCdNamespaceNotFound(_) => reasons::ARGOCD_NAMESPACE_NOT_FOUND,
            ReconcileError::RegistrationConflict { .. } => reasons::ARGOCD_SECRET_CONFLICT,
            ReconcileError::ArgoCdCleanup(_) => reasons::ARGOCD_CLEANUP_FAILED,
            ReconcileError::ReadinessCheck(_) => reasons::CHECK_FAILED,
            ReconcileError::Status(_) => reasons::STATUS_UPDATE_FAILED,
            ReconcileError::Timeout(_) => reasons::RECONCILE_TIMEOUT,
        }
    }
}

/// Why a requeue was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Finalizer was just attached
    FinalizerAttached,
    /// Waiting for the issuance backend
    WaitingForResource,
    /// Fibonacci backoff after a failure
    ErrorBackoff,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::FinalizerAttached => "finalizer-attached",
            TriggerSource::WaitingForResource => "waiting-for-resource",
            TriggerSource::ErrorBackoff => "error-backoff",
        }
    }
}

/// Tunables of a reconciliation attempt
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Delay before re-checking resources still being issued
    pub requeue_after: Duration,
    /// Upper bound on one attempt
    pub reconcile_timeout: Duration,
    /// Namespace holding ArgoCD cluster secrets
    pub argocd_namespace: String,
    pub error_backoff_min_minutes: u64,
    pub error_backoff_max_minutes: u64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            requeue_after: Duration::from_secs(DEFAULT_REQUEUE_AFTER_SECS),
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            argocd_namespace: DEFAULT_ARGOCD_NAMESPACE.to_string(),
            error_backoff_min_minutes: DEFAULT_ERROR_BACKOFF_MIN_MINUTES,
            error_backoff_max_minutes: DEFAULT_ERROR_BACKOFF_MAX_MINUTES,
        }
    }
}

impl From<&ControllerConfig> for ReconcileSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            requeue_after: config.requeue_after_duration(),
            reconcile_timeout: config.reconcile_timeout_duration(),
            argocd_namespace: config.argocd_namespace.clone(),
            error_backoff_min_minutes: config.error_backoff_min_minutes,
            error_backoff_max_minutes: config.error_backoff_max_minutes,
        }
    }
}

/// Shared reconciliation context
#[derive(Debug)]
pub struct Reconciler<S> {
    pub store: S,
    pub settings: ReconcileSettings,
    /// Per-resource backoff, keyed by `namespace/name`
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl<S> Reconciler<S> {
    pub fn new(store: S, settings: ReconcileSettings) -> Self {
        Self {
            store,
            settings,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a failure for `key` and return the delay before retrying
    pub fn next_error_backoff(&self, key: &str) -> (Duration, u32) {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(key.to_string()).or_insert_with(|| {
            BackoffState::new(
                self.settings.error_backoff_min_minutes,
                self.settings.error_backoff_max_minutes,
            )
        });
        let delay = state.record_error();
        (delay, state.error_count)
    }

    /// Forget accumulated backoff after a successful attempt
    pub fn reset_backoff(&self, key: &str) {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
