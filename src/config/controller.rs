//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_ARGOCD_NAMESPACE, DEFAULT_ERROR_BACKOFF_MAX_MINUTES, DEFAULT_ERROR_BACKOFF_MIN_MINUTES,
    DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_METRICS_PORT, DEFAULT_RECONCILE_TIMEOUT_SECS,
    DEFAULT_REQUEUE_AFTER_SECS, DEFAULT_SERVER_POLL_INTERVAL_MS,
    DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// How long to wait for the HTTP server to bind (seconds)
    pub server_startup_timeout_secs: u64,
    /// Poll interval while waiting for the HTTP server (milliseconds)
    pub server_poll_interval_ms: u64,
    /// Delay before re-checking resources still being issued (seconds)
    pub requeue_after_secs: u64,
    /// Upper bound on one reconciliation attempt (seconds)
    pub reconcile_timeout_secs: u64,
    /// Fibonacci backoff floor after a failed attempt (minutes)
    pub error_backoff_min_minutes: u64,
    /// Fibonacci backoff cap after repeated failures (minutes)
    pub error_backoff_max_minutes: u64,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: usize,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Namespace where ArgoCD reads cluster registration secrets
    pub argocd_namespace: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            requeue_after_secs: DEFAULT_REQUEUE_AFTER_SECS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            error_backoff_min_minutes: DEFAULT_ERROR_BACKOFF_MIN_MINUTES,
            error_backoff_max_minutes: DEFAULT_ERROR_BACKOFF_MAX_MINUTES,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            argocd_namespace: DEFAULT_ARGOCD_NAMESPACE.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            server_startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            server_poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
            requeue_after_secs: env_var_or_default("REQUEUE_AFTER_SECS", DEFAULT_REQUEUE_AFTER_SECS),
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            error_backoff_min_minutes: env_var_or_default(
                "ERROR_BACKOFF_MIN_MINUTES",
                DEFAULT_ERROR_BACKOFF_MIN_MINUTES,
            ),
            error_backoff_max_minutes: env_var_or_default(
                "ERROR_BACKOFF_MAX_MINUTES",
                DEFAULT_ERROR_BACKOFF_MAX_MINUTES,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            argocd_namespace: env_var_or_default_str("ARGOCD_NAMESPACE", DEFAULT_ARGOCD_NAMESPACE),
        }
    }

    #[must_use]
    pub fn requeue_after_duration(&self) -> Duration {
        Duration::from_secs(self.requeue_after_secs)
    }

    #[must_use]
    pub fn reconcile_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    #[must_use]
    pub fn server_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.server_startup_timeout_secs)
    }

    #[must_use]
    pub fn server_poll_interval(&self) -> Duration {
        Duration::from_millis(self.server_poll_interval_ms)
    }

    /// Whether logs should be emitted as JSON lines
    #[must_use]
    pub fn json_logs(&self) -> bool {
        !self.log_format.eq_ignore_ascii_case("text")
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read environment variable as boolean or return default
pub(crate) fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}
