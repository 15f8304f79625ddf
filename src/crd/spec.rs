//! # CertificateSet Spec
//!
//! Main CRD specification and default values.

use crate::constants::{DEFAULT_ISSUER_API_VERSION, DEFAULT_ISSUER_KIND};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CertificateSet Custom Resource Definition
///
/// Declares the certificate topology of one cluster: a CA, optional system
/// certificates, and optional kubeconfig / ArgoCD registration secrets derived
/// from a super-admin client certificate.
///
/// # Example
///
/// ```yaml
/// apiVersion: in-cloud.io/v1alpha1
/// kind: CertificateSet
/// metadata:
///   name: tenant-a
///   namespace: clusters
/// spec:
///   environment: infra
///   kubeconfig: true
///   argocdCluster: true
///   kubeconfigEndpoint: https://tenant-a.example.com:6443
///   issuerRef:
///     name: root-ca
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CertificateSet",
    group = "in-cloud.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::CertificateSetStatus",
    shortname = "cs",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Environment", "type":"string", "jsonPath":".spec.environment"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSetSpec {
    /// Register the cluster with ArgoCD through a cluster secret
    #[serde(default)]
    pub argocd_cluster: bool,
    /// Which certificates the cluster needs. Immutable.
    pub environment: Environment,
    /// Produce a `<name>-kubeconfig` secret for the super-admin. Immutable.
    #[serde(default)]
    pub kubeconfig: bool,
    /// Authority signing the CA-style certificates
    pub issuer_ref: IssuerReference,
    /// Authority signing the OIDC certificate in `infra`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_ref_oidc: Option<IssuerReference>,
    /// API server URL embedded in derived secrets. Settable once.
    #[serde(default)]
    pub kubeconfig_endpoint: String,
}

/// Cluster environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Tenant cluster: CA only
    Client,
    /// Control-plane cluster: CA, etcd, front-proxy and OIDC CAs
    System,
    /// Infrastructure cluster: like `system` with a leaf OIDC certificate
    Infra,
}

impl Environment {
    /// Whether the etcd, front-proxy and OIDC certificates are part of the set
    #[must_use]
    pub fn needs_system_certificates(self) -> bool {
        matches!(self, Environment::System | Environment::Infra)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Client => "client",
            Environment::System => "system",
            Environment::Infra => "infra",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a cert-manager issuer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuerReference {
    #[serde(default = "default_issuer_api_version")]
    pub api_version: String,
    #[serde(default = "default_issuer_kind")]
    pub kind: String,
    pub name: String,
}

impl IssuerReference {
    /// API group part of `apiVersion` (empty for a core version such as `v1`)
    #[must_use]
    pub fn group(&self) -> &str {
        self.api_version
            .split_once('/')
            .map_or("", |(group, _)| group)
    }
}

#[must_use]
pub fn default_issuer_api_version() -> String {
    DEFAULT_ISSUER_API_VERSION.to_string()
}

#[must_use]
pub fn default_issuer_kind() -> String {
    DEFAULT_ISSUER_KIND.to_string()
}

impl CertificateSet {
    /// Whether the super-admin certificate (and the Issuer signing it) is needed
    #[must_use]
    pub fn needs_client_certificates(&self) -> bool {
        self.spec.kubeconfig || self.spec.argocd_cluster
    }

    /// Whether the object is being deleted
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
