//! Common test utilities for engine tests
//!
//! A [`Harness`] wraps a [`MemoryStore`] and plays the part of both the
//! Kubernetes watch (each run reads the latest stored CertificateSet) and the
//! cert-manager backend (issuing secrets and marking resources Ready on demand).

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers")]

use certificate_set_controller::controller::reconciler::{
    reconcile, ReconcileError, ReconcileSettings, Reconciler,
};
use certificate_set_controller::crd::{
    Certificate, CertificateSet, CertificateSetSpec, Condition, Environment, Issuer,
    IssuerReference,
};
use certificate_set_controller::store::{MemoryStore, StoredResource};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const NAMESPACE: &str = "clusters";
pub const ARGOCD_NAMESPACE: &str = "beget-argocd";
pub const NAME: &str = "tenant";
pub const ENDPOINT: &str = "https://tenant.example.com:6443";

const MAX_ATTEMPTS: usize = 10;

pub fn certificate_set(environment: Environment, kubeconfig: bool, argocd_cluster: bool) -> CertificateSet {
    let mut cs = CertificateSet::new(
        NAME,
        CertificateSetSpec {
            argocd_cluster,
            environment,
            kubeconfig,
            issuer_ref: IssuerReference {
                api_version: "cert-manager.io/v1".to_string(),
                kind: "ClusterIssuer".to_string(),
                name: "root".to_string(),
            },
            issuer_ref_oidc: None,
            kubeconfig_endpoint: ENDPOINT.to_string(),
        },
    );
    cs.metadata.namespace = Some(NAMESPACE.to_string());
    cs.metadata.labels = Some(BTreeMap::from([("team".to_string(), "platform".to_string())]));
    cs
}

pub struct Harness {
    pub store: MemoryStore,
    pub ctx: Arc<Reconciler<MemoryStore>>,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        store.add_namespace(NAMESPACE);
        store.add_namespace(ARGOCD_NAMESPACE);
        let ctx = Arc::new(Reconciler::new(store.clone(), ReconcileSettings::default()));
        Self { store, ctx }
    }

    pub fn with(cs: &CertificateSet) -> Self {
        let harness = Self::new();
        harness.store.insert(cs).expect("seed CertificateSet");
        harness
    }

    /// Latest stored CertificateSet, as the watch would deliver it
    pub fn current(&self) -> Option<CertificateSet> {
        self.store.object(NAMESPACE, NAME)
    }

    pub async fn run(&self) -> Result<Action, ReconcileError> {
        let cs = self.current().expect("CertificateSet exists");
        reconcile(Arc::new(cs), Arc::clone(&self.ctx)).await
    }

    /// Write a key pair into the secret of every certificate that lacks one
    pub fn issue_secrets(&self) {
        for certificate in self.store.list::<Certificate>(NAMESPACE) {
            let secret_name = certificate.spec.secret_name.clone();
            if self.store.object::<Secret>(NAMESPACE, &secret_name).is_none() {
                self.store
                    .insert(&issued_secret(&secret_name))
                    .expect("seed issued secret");
            }
        }
    }

    pub fn mark_certificates_ready(&self) {
        for certificate in self.store.list::<Certificate>(NAMESPACE) {
            self.mark_ready::<Certificate>(&certificate.name_any());
        }
    }

    pub fn mark_issuers_ready(&self) {
        for issuer in self.store.list::<Issuer>(NAMESPACE) {
            self.mark_ready::<Issuer>(&issuer.name_any());
        }
    }

    pub fn mark_ready<K: StoredResource>(&self, name: &str) {
        self.store.set_status::<K>(
            NAMESPACE,
            name,
            json!({"conditions": [{"type": "Ready", "status": "True", "reason": "Ready"}]}),
        );
    }

    /// cert-manager catches up with everything created so far
    pub fn backend_tick(&self) {
        self.issue_secrets();
        self.mark_certificates_ready();
        self.mark_issuers_ready();
    }

    /// Run and let the backend catch up until the controller stops requeueing;
    /// returns the number of attempts
    pub async fn converge(&self) -> usize {
        for attempt in 1..=MAX_ATTEMPTS {
            let action = self
                .run()
                .await
                .unwrap_or_else(|e| panic!("attempt {attempt} failed: {e}"));
            if action == Action::await_change() {
                return attempt;
            }
            self.backend_tick();
        }
        panic!("CertificateSet did not converge within {MAX_ATTEMPTS} attempts");
    }

    pub fn condition(&self, condition_type: &str) -> Option<Condition> {
        self.current()?
            .status?
            .condition(condition_type)
            .cloned()
    }

    pub fn certificate_names(&self) -> BTreeSet<String> {
        self.store
            .list::<Certificate>(NAMESPACE)
            .iter()
            .map(ResourceExt::name_any)
            .collect()
    }

    pub fn issuer_names(&self) -> BTreeSet<String> {
        self.store
            .list::<Issuer>(NAMESPACE)
            .iter()
            .map(ResourceExt::name_any)
            .collect()
    }

    pub fn certificate(&self, name: &str) -> Certificate {
        self.store
            .object(NAMESPACE, name)
            .unwrap_or_else(|| panic!("Certificate {name} exists"))
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.store.object(namespace, name)
    }

    pub fn registration_secret(&self) -> Option<Secret> {
        self.secret(ARGOCD_NAMESPACE, &format!("{NAME}-argocd-cluster"))
    }

    pub fn kubeconfig_secret(&self) -> Option<Secret> {
        self.secret(NAMESPACE, &format!("{NAME}-kubeconfig"))
    }
}

pub fn issued_secret(name: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        type_: Some("kubernetes.io/tls".to_string()),
        data: Some(BTreeMap::from([
            ("ca.crt".to_string(), ByteString(b"ca-cert-pem".to_vec())),
            ("tls.crt".to_string(), ByteString(format!("{name}-cert-pem").into_bytes())),
            ("tls.key".to_string(), ByteString(format!("{name}-key-pem").into_bytes())),
        ])),
        ..Default::default()
    }
}

/// UTF-8 value of a secret key
pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    let bytes = secret.data.as_ref()?.get(key)?.0.clone();
    String::from_utf8(bytes).ok()
}

pub fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}
