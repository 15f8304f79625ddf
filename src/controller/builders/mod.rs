//! # Resource Builders
//!
//! Pure functions mapping a [`CertificateSet`] to the child resources it owns.
//! Nothing in here performs I/O; the reconciler decides when and how each
//! result is written, according to the kind's [`ApplyPolicy`].
//!
//! - `names.rs` - child names by fixed suffix
//! - `certificates.rs` - cert-manager `Certificate` / `Issuer`
//! - `secrets.rs` - kubeconfig and ArgoCD cluster secrets
//! - `templates.rs` - strict payload templates

pub mod certificates;
pub mod names;
pub mod secrets;
pub mod templates;

pub use certificates::{
    build_ca_certificate, build_etcd_certificate, build_issuer, build_oidc_certificate,
    build_proxy_certificate, build_super_admin_certificate, ca_phase_certificates,
};
pub use names::all_certificate_names;
pub use secrets::{
    build_argocd_cluster_secret, build_kubeconfig_secret, registration_owner, CredentialBundle,
};
pub use templates::BuildError;

use crate::constants::LAST_APPLIED_ANNOTATION;
use crate::crd::CertificateSet;
use kube::api::ObjectMeta;
use kube::Resource;
use secrets::{ARGOCD_CONFIG_KEY, ARGOCD_NAME_KEY, ARGOCD_SERVER_KEY, KUBECONFIG_KEY};
use std::collections::BTreeMap;

/// How a desired child is written when it may already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPolicy {
    /// Create when missing; never touch an existing object
    CreateIfAbsent,
    /// Create when missing; otherwise overwrite spec/data, labels and annotations
    CreateOrUpdate,
    /// Create when missing; otherwise overwrite only the listed data keys
    CreateOrUpdateManagedFields(&'static [&'static str]),
}

/// Certificates keep whatever signing authority they were created with
pub const CERTIFICATE_POLICY: ApplyPolicy = ApplyPolicy::CreateIfAbsent;
pub const ISSUER_POLICY: ApplyPolicy = ApplyPolicy::CreateIfAbsent;
pub const KUBECONFIG_SECRET_POLICY: ApplyPolicy =
    ApplyPolicy::CreateOrUpdateManagedFields(&[KUBECONFIG_KEY]);
pub const ARGOCD_SECRET_POLICY: ApplyPolicy = ApplyPolicy::CreateOrUpdateManagedFields(&[
    ARGOCD_CONFIG_KEY,
    ARGOCD_NAME_KEY,
    ARGOCD_SERVER_KEY,
]);

/// Parent annotations minus `kubectl.kubernetes.io/last-applied-configuration`
#[must_use]
pub fn copy_annotations(cs: &CertificateSet) -> Option<BTreeMap<String, String>> {
    cs.metadata.annotations.as_ref().map(|annotations| {
        annotations
            .iter()
            .filter(|(key, _)| key.as_str() != LAST_APPLIED_ANNOTATION)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    })
}

/// Metadata of a child in the parent's namespace, controlled by the parent
pub(crate) fn child_metadata(cs: &CertificateSet, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: cs.metadata.namespace.clone(),
        labels: cs.metadata.labels.clone(),
        annotations: copy_annotations(cs),
        owner_references: cs.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    }
}
