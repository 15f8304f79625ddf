//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Delay before re-checking resources the issuance backend has not finished (seconds)
pub const DEFAULT_REQUEUE_AFTER_SECS: u64 = 5;

/// Upper bound on a single reconciliation attempt (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;

/// Fibonacci error backoff floor (minutes)
pub const DEFAULT_ERROR_BACKOFF_MIN_MINUTES: u64 = 1;

/// Fibonacci error backoff ceiling (minutes)
pub const DEFAULT_ERROR_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default maximum number of CertificateSets reconciled at once
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: usize = 10;

/// Namespace ArgoCD reads cluster registration secrets from
pub const DEFAULT_ARGOCD_NAMESPACE: &str = "beget-argocd";

/// Field manager recorded on status patches
pub const FIELD_MANAGER: &str = "certificate-set-controller";

/// Finalizer guarding cleanup of the cross-namespace registration secret
pub const FINALIZER_NAME: &str = "certificateset.in-cloud.io/cleanup";

/// Annotation recording which CertificateSet owns a registration secret
/// (owner references cannot cross namespaces)
pub const REGISTRATION_OWNER_ANNOTATION: &str = "certificateset.in-cloud.io/owner";

/// Annotation never propagated from the parent onto children
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Label ArgoCD uses to discover cluster secrets
pub const ARGOCD_SECRET_TYPE_LABEL: &str = "argocd.argoproj.io/secret-type";

/// Value of [`ARGOCD_SECRET_TYPE_LABEL`] for cluster secrets
pub const ARGOCD_SECRET_TYPE_CLUSTER: &str = "cluster";

/// Default `issuerRef.apiVersion`
pub const DEFAULT_ISSUER_API_VERSION: &str = "cert-manager.io/v1";

/// Default `issuerRef.kind`
pub const DEFAULT_ISSUER_KIND: &str = "ClusterIssuer";

/// cert-manager API group
pub const CERT_MANAGER_GROUP: &str = "cert-manager.io";

/// Lifetime of CA-style and OIDC certificates (20 years)
pub const CA_CERTIFICATE_DURATION: &str = "175200h";

/// Lifetime of the super-admin client certificate (1 year)
pub const CLIENT_CERTIFICATE_DURATION: &str = "8760h";

/// How long before expiry cert-manager renews a certificate (30 days)
pub const CERTIFICATE_RENEW_BEFORE: &str = "720h";

/// RSA key size for every issued certificate
pub const PRIVATE_KEY_SIZE: i32 = 2048;

/// Organization granting cluster-admin to the super-admin certificate
pub const SUPER_ADMIN_ORGANIZATION: &str = "system:masters";
