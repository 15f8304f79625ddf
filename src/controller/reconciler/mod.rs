//! # Reconciler
//!
//! Drives a CertificateSet to convergence.
//!
//! - `apply.rs` - create / update children per [`crate::controller::builders::ApplyPolicy`]
//! - `cleanup.rs` - finalizer and ArgoCD cluster secret removal
//! - `readiness.rs` - issuance backend readiness checks
//! - `reconcile.rs` - the phase sequence of one attempt
//! - `status.rs` - Ready / Progressing / Degraded conditions
//! - `types.rs` - errors, settings and the shared context

pub mod apply;
pub mod cleanup;
pub mod readiness;
mod reconcile;
pub mod status;
mod types;

pub use apply::{apply, Apply, ApplyOutcome};
pub use reconcile::{reconcile, resource_key};
pub use status::StatusDelta;
pub use types::{ReconcileError, ReconcileSettings, Reconciler, TriggerSource};
