//! # OpenTelemetry Support
//!
//! Datadog trace export via `datadog-opentelemetry`, enabled only when
//! `DD_API_KEY` is present in the environment. Without it the controller
//! logs through the plain tracing subscriber.

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

/// Tracer provider handle for graceful shutdown
#[derive(Debug)]
pub enum TracerProviderHandle {
    Datadog(opentelemetry_sdk::trace::SdkTracerProvider),
}

/// Initialize OpenTelemetry tracing from `DD_*` environment variables
///
/// Returns `Ok(None)` when Datadog is not configured.
///
/// # Errors
///
/// Returns an error if initialization fails.
pub fn init_otel() -> Result<Option<TracerProviderHandle>> {
    if std::env::var("DD_API_KEY").is_err() {
        info!("No OpenTelemetry configuration provided, skipping Otel initialization");
        return Ok(None);
    }

    if std::env::var("DD_SERVICE").is_err() {
        std::env::set_var("DD_SERVICE", "certificate-set-controller");
    }
    if std::env::var("DD_VERSION").is_err() {
        let build_version = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("BUILD_GIT_HASH"));
        std::env::set_var("DD_VERSION", build_version);
    }
    if std::env::var("DD_SITE").is_err() {
        std::env::set_var("DD_SITE", "datadoghq.com");
    }
    if std::env::var("DD_TRACE_AGENT_URL").is_err() {
        std::env::set_var("DD_TRACE_AGENT_URL", "http://localhost:8126");
    }

    info!(
        "Initializing Datadog OpenTelemetry tracing: service={}, version={}, env={:?}",
        std::env::var("DD_SERVICE").unwrap_or_default(),
        std::env::var("DD_VERSION").unwrap_or_default(),
        std::env::var("DD_ENV").ok(),
    );

    let tracer_provider = datadog_opentelemetry::tracing().init();

    info!(
        "Datadog tracing initialized, traces go to {}",
        std::env::var("DD_TRACE_AGENT_URL").unwrap_or_default()
    );
    Ok(Some(TracerProviderHandle::Datadog(tracer_provider)))
}

/// Flush pending spans and shut the tracer provider down
pub fn shutdown_otel(tracer_provider: Option<TracerProviderHandle>) {
    match tracer_provider {
        Some(TracerProviderHandle::Datadog(provider)) => {
            info!("Shutting down Datadog tracer provider...");
            if let Err(e) = provider.shutdown_with_timeout(Duration::from_secs(5)) {
                warn!("Error shutting down Datadog tracer provider: {}", e);
            }
        }
        None => {}
    }
}
