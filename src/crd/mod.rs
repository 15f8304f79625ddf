//! # Custom Resource Definitions
//!
//! CRD types for the CertificateSet controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `CertificateSet` specification and default values
//! - `status.rs` - Status types for tracking convergence
//! - `cert_manager.rs` - cert-manager `Certificate` / `Issuer` types the controller creates
//! - `schema.rs` - generated CRD with CEL validation rules

mod cert_manager;
pub mod schema;
mod spec;
mod status;

// Re-export all public types
pub use cert_manager::{
    CaIssuer, CertManagerCondition, CertManagerStatus, Certificate, CertificatePrivateKey,
    CertificateSecretTemplate, CertificateSpec, Issuer, IssuerObjectReference, IssuerSpec,
    KeyUsage, PrivateKeyAlgorithm, RotationPolicy, X509Subject,
};
pub use spec::{
    default_issuer_api_version, default_issuer_kind, CertificateSet, CertificateSetSpec,
    Environment, IssuerReference,
};
pub use status::{CertificateSetStatus, Condition};
