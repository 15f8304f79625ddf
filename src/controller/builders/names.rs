//! Child resource names, all derived from the CertificateSet name by a fixed suffix.

use crate::crd::CertificateSet;
use kube::ResourceExt;

pub const CA_SUFFIX: &str = "-ca";
pub const ETCD_SUFFIX: &str = "-etcd";
pub const PROXY_SUFFIX: &str = "-proxy";
pub const CA_OIDC_SUFFIX: &str = "-ca-oidc";
pub const SUPER_ADMIN_SUFFIX: &str = "-super-admin";
pub const KUBECONFIG_SUFFIX: &str = "-kubeconfig";
pub const ARGOCD_CLUSTER_SUFFIX: &str = "-argocd-cluster";

fn suffixed(cs: &CertificateSet, suffix: &str) -> String {
    format!("{}{suffix}", cs.name_any())
}

/// CA Certificate, its Secret, and the Issuer built over it
#[must_use]
pub fn ca_name(cs: &CertificateSet) -> String {
    suffixed(cs, CA_SUFFIX)
}

#[must_use]
pub fn etcd_name(cs: &CertificateSet) -> String {
    suffixed(cs, ETCD_SUFFIX)
}

#[must_use]
pub fn proxy_name(cs: &CertificateSet) -> String {
    suffixed(cs, PROXY_SUFFIX)
}

#[must_use]
pub fn ca_oidc_name(cs: &CertificateSet) -> String {
    suffixed(cs, CA_OIDC_SUFFIX)
}

/// super-admin Certificate and its Secret
#[must_use]
pub fn super_admin_name(cs: &CertificateSet) -> String {
    suffixed(cs, SUPER_ADMIN_SUFFIX)
}

#[must_use]
pub fn kubeconfig_name(cs: &CertificateSet) -> String {
    suffixed(cs, KUBECONFIG_SUFFIX)
}

#[must_use]
pub fn argocd_cluster_name(cs: &CertificateSet) -> String {
    suffixed(cs, ARGOCD_CLUSTER_SUFFIX)
}

/// Certificates that should exist for the current flags, in dependency order
#[must_use]
pub fn all_certificate_names(cs: &CertificateSet) -> Vec<String> {
    let mut names = vec![ca_name(cs)];
    if cs.spec.environment.needs_system_certificates() {
        names.extend([etcd_name(cs), proxy_name(cs), ca_oidc_name(cs)]);
    }
    if cs.needs_client_certificates() {
        names.push(super_admin_name(cs));
    }
    names
}
