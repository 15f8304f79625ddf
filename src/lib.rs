//! CertificateSet Controller Library
//!
//! Core functionality of the CertificateSet controller. Unit tests live next to
//! the code; engine scenarios are in `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use certificate_set_controller::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
