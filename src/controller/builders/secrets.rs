//! # Derived Secret Builders
//!
//! Kubeconfig and ArgoCD cluster registration secrets built from the
//! super-admin key pair.

use super::templates::{render_argocd_config, render_kubeconfig, BuildError};
use super::{child_metadata, copy_annotations, names};
use crate::constants::{
    ARGOCD_SECRET_TYPE_CLUSTER, ARGOCD_SECRET_TYPE_LABEL, REGISTRATION_OWNER_ANNOTATION,
};
use crate::crd::CertificateSet;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use minijinja::context;
use std::collections::BTreeMap;

/// Keys cert-manager writes into an issued secret
pub const CA_CERT_KEY: &str = "ca.crt";
pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_KEY_KEY: &str = "tls.key";

/// Managed key of the kubeconfig secret
pub const KUBECONFIG_KEY: &str = "value";

/// Managed keys of the ArgoCD cluster secret
pub const ARGOCD_CONFIG_KEY: &str = "config";
pub const ARGOCD_NAME_KEY: &str = "name";
pub const ARGOCD_SERVER_KEY: &str = "server";

const OPAQUE: &str = "Opaque";

/// Issued key material, each field base64-encoded for embedding
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    pub ca_cert: String,
    pub tls_cert: String,
    pub tls_key: String,
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("ca_cert_len", &self.ca_cert.len())
            .field("tls_cert_len", &self.tls_cert.len())
            .finish_non_exhaustive()
    }
}

/// Value of the ownership annotation on a registration secret
#[must_use]
pub fn registration_owner(cs: &CertificateSet) -> String {
    format!("{}/{}", cs.namespace().unwrap_or_default(), cs.name_any())
}

fn opaque_secret(metadata: ObjectMeta, data: BTreeMap<String, ByteString>) -> Secret {
    Secret {
        metadata,
        type_: Some(OPAQUE.to_string()),
        data: Some(data),
        ..Default::default()
    }
}

/// `<name>-kubeconfig` holding a super-admin kubeconfig under `value`
///
/// # Errors
///
/// Returns [`BuildError`] if the kubeconfig template fails to render.
pub fn build_kubeconfig_secret(
    cs: &CertificateSet,
    bundle: &CredentialBundle,
) -> Result<Secret, BuildError> {
    let kubeconfig = render_kubeconfig(&context! {
        cluster_name => cs.name_any(),
        server => &cs.spec.kubeconfig_endpoint,
        ca_cert => &bundle.ca_cert,
        tls_cert => &bundle.tls_cert,
        tls_key => &bundle.tls_key,
    })?;

    let mut metadata = child_metadata(cs, &names::kubeconfig_name(cs));
    metadata.labels = Some(metadata.labels.unwrap_or_default());

    Ok(opaque_secret(
        metadata,
        BTreeMap::from([(KUBECONFIG_KEY.to_string(), ByteString(kubeconfig.into_bytes()))]),
    ))
}

/// `<name>-argocd-cluster` in the ArgoCD namespace
///
/// Lives outside the CertificateSet namespace, so it carries an ownership
/// annotation instead of an owner reference and is removed by the finalizer.
///
/// # Errors
///
/// Returns [`BuildError`] if the config template fails to render.
pub fn build_argocd_cluster_secret(
    cs: &CertificateSet,
    bundle: &CredentialBundle,
    argocd_namespace: &str,
) -> Result<Secret, BuildError> {
    let config = render_argocd_config(&context! {
        ca_cert => &bundle.ca_cert,
        tls_cert => &bundle.tls_cert,
        tls_key => &bundle.tls_key,
    })?;

    let mut labels = cs.metadata.labels.clone().unwrap_or_default();
    labels.insert(
        ARGOCD_SECRET_TYPE_LABEL.to_string(),
        ARGOCD_SECRET_TYPE_CLUSTER.to_string(),
    );
    let mut annotations = copy_annotations(cs).unwrap_or_default();
    annotations.insert(
        REGISTRATION_OWNER_ANNOTATION.to_string(),
        registration_owner(cs),
    );

    let metadata = ObjectMeta {
        name: Some(names::argocd_cluster_name(cs)),
        namespace: Some(argocd_namespace.to_string()),
        labels: Some(labels),
        annotations: Some(annotations),
        ..Default::default()
    };

    Ok(opaque_secret(
        metadata,
        BTreeMap::from([
            (ARGOCD_CONFIG_KEY.to_string(), ByteString(config.into_bytes())),
            (ARGOCD_NAME_KEY.to_string(), ByteString(cs.name_any().into_bytes())),
            (
                ARGOCD_SERVER_KEY.to_string(),
                ByteString(cs.spec.kubeconfig_endpoint.clone().into_bytes()),
            ),
        ]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{CertificateSetSpec, Environment, IssuerReference};

    fn certificate_set() -> CertificateSet {
        let mut cs = CertificateSet::new(
            "tenant",
            CertificateSetSpec {
                argocd_cluster: true,
                environment: Environment::Client,
                kubeconfig: true,
                issuer_ref: IssuerReference {
                    api_version: "cert-manager.io/v1".to_string(),
                    kind: "ClusterIssuer".to_string(),
                    name: "root".to_string(),
                },
                issuer_ref_oidc: None,
                kubeconfig_endpoint: "https://tenant:6443".to_string(),
            },
        );
        cs.metadata.namespace = Some("clusters".to_string());
        cs.metadata.uid = Some("cs-uid".to_string());
        cs.metadata.labels = Some(BTreeMap::from([("team".to_string(), "a".to_string())]));
        cs
    }

    fn bundle() -> CredentialBundle {
        CredentialBundle {
            ca_cert: "Q0E=".to_string(),
            tls_cert: "Q0VSVA==".to_string(),
            tls_key: "S0VZ".to_string(),
        }
    }

    fn data(secret: &Secret, key: &str) -> String {
        let bytes = &secret.data.as_ref().unwrap()[key].0;
        String::from_utf8(bytes.clone()).unwrap()
    }

    #[test]
    fn kubeconfig_secret_embeds_bundle_and_endpoint() {
        let secret = build_kubeconfig_secret(&certificate_set(), &bundle()).unwrap();

        assert_eq!(secret.name_any(), "tenant-kubeconfig");
        assert_eq!(secret.namespace().as_deref(), Some("clusters"));
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        let kubeconfig = data(&secret, KUBECONFIG_KEY);
        assert!(kubeconfig.contains("certificate-authority-data: Q0E="));
        assert!(kubeconfig.contains("server: https://tenant:6443"));
        assert!(kubeconfig.contains("user: tenant-super-admin"));
        assert_eq!(secret.owner_references().len(), 1);
    }

    #[test]
    fn argocd_secret_lives_in_argocd_namespace_without_owner() {
        let secret = build_argocd_cluster_secret(&certificate_set(), &bundle(), "beget-argocd")
            .unwrap();

        assert_eq!(secret.name_any(), "tenant-argocd-cluster");
        assert_eq!(secret.namespace().as_deref(), Some("beget-argocd"));
        assert!(secret.owner_references().is_empty());
        assert_eq!(
            secret
                .labels()
                .get("argocd.argoproj.io/secret-type")
                .map(String::as_str),
            Some("cluster")
        );
        assert_eq!(secret.labels().get("team").map(String::as_str), Some("a"));
        assert_eq!(
            secret
                .annotations()
                .get(REGISTRATION_OWNER_ANNOTATION)
                .map(String::as_str),
            Some("clusters/tenant")
        );
        assert_eq!(data(&secret, ARGOCD_NAME_KEY), "tenant");
        assert_eq!(data(&secret, ARGOCD_SERVER_KEY), "https://tenant:6443");

        let config: serde_json::Value =
            serde_json::from_str(&data(&secret, ARGOCD_CONFIG_KEY)).unwrap();
        assert_eq!(config["tlsClientConfig"]["keyData"], "S0VZ");
    }

    #[test]
    fn rendering_is_deterministic() {
        let cs = certificate_set();
        assert_eq!(
            build_kubeconfig_secret(&cs, &bundle()).unwrap(),
            build_kubeconfig_secret(&cs, &bundle()).unwrap()
        );
    }

    #[test]
    fn bundle_debug_hides_key_material() {
        let rendered = format!("{:?}", bundle());
        assert!(!rendered.contains("S0VZ"));
    }
}
