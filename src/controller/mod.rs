//! # Controller
//!
//! Core controller modules for the CertificateSet controller.
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `builders`: Pure child resource builders
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod builders;
pub mod reconciler;
pub mod server;
