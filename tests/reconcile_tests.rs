//! Engine scenarios
//!
//! Drives the reconciler against the in-memory store, with the harness standing
//! in for cert-manager, and checks the child resources and conditions that result.

mod common;

use certificate_set_controller::controller::reconciler::{reconcile, ReconcileSettings, Reconciler};
use certificate_set_controller::crd::{Certificate, CertificateSet, Environment, IssuerReference};
use certificate_set_controller::runtime::error_policy;
use certificate_set_controller::store::memory::RecordedWrite;
use certificate_set_controller::store::{MemoryStore, ResourceStore, StoreOp};
use common::{
    certificate_set, issued_secret, names, secret_value, Harness, ARGOCD_NAMESPACE, ENDPOINT,
    NAME, NAMESPACE,
};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn certificate_writes(writes: &[RecordedWrite]) -> Vec<&RecordedWrite> {
    writes.iter().filter(|w| w.kind == "Certificate").collect()
}

#[tokio::test]
async fn child_set_follows_environment_and_flags() {
    let cases = [
        (Environment::Client, false, false, vec!["tenant-ca"], false),
        (
            Environment::Client,
            true,
            false,
            vec!["tenant-ca", "tenant-super-admin"],
            true,
        ),
        (
            Environment::System,
            false,
            false,
            vec!["tenant-ca", "tenant-etcd", "tenant-proxy", "tenant-ca-oidc"],
            false,
        ),
        (
            Environment::Infra,
            false,
            true,
            vec![
                "tenant-ca",
                "tenant-etcd",
                "tenant-proxy",
                "tenant-ca-oidc",
                "tenant-super-admin",
            ],
            true,
        ),
    ];

    for (environment, kubeconfig, argocd, expected, has_issuer) in cases {
        let harness = Harness::with(&certificate_set(environment, kubeconfig, argocd));
        harness.converge().await;

        assert_eq!(
            harness.certificate_names(),
            names(&expected),
            "{environment} kubeconfig={kubeconfig} argocd={argocd}"
        );
        assert_eq!(harness.issuer_names().contains("tenant-ca"), has_issuer);
        assert_eq!(harness.kubeconfig_secret().is_some(), kubeconfig);
        assert_eq!(harness.registration_secret().is_some(), argocd);
        assert!(harness.condition("Ready").unwrap().is_true());
    }
}

#[tokio::test]
async fn converged_set_is_not_rewritten() {
    let harness = Harness::with(&certificate_set(Environment::Infra, true, true));
    harness.converge().await;
    harness.store.clear_writes();

    let action = harness.run().await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(harness.store.writes(), Vec::new());
}

#[tokio::test]
async fn issuer_change_does_not_touch_existing_certificates() {
    let harness = Harness::with(&certificate_set(Environment::System, false, false));
    harness.converge().await;
    let before = harness.certificate("tenant-ca");
    harness.store.clear_writes();

    harness
        .store
        .edit::<CertificateSet>(NAMESPACE, NAME, |cs| {
            cs.spec.issuer_ref = IssuerReference {
                api_version: "cert-manager.io/v1".to_string(),
                kind: "ClusterIssuer".to_string(),
                name: "rotated-root".to_string(),
            };
        });
    harness.converge().await;

    assert!(certificate_writes(&harness.store.writes()).is_empty());
    assert_eq!(harness.certificate("tenant-ca").spec, before.spec);
    let ready = harness.condition("Ready").unwrap();
    assert!(ready.is_true());
    assert_eq!(ready.observed_generation, Some(2));
}

#[tokio::test]
async fn disabling_argocd_removes_registration_and_enabling_restores_it() {
    let harness = Harness::with(&certificate_set(Environment::Client, false, true));
    harness.converge().await;
    assert!(harness.registration_secret().is_some());

    harness
        .store
        .edit::<CertificateSet>(NAMESPACE, NAME, |cs| cs.spec.argocd_cluster = false);
    harness.converge().await;
    assert!(harness.registration_secret().is_none());
    assert_eq!(harness.certificate_names(), names(&["tenant-ca"]));
    assert!(harness.issuer_names().is_empty());

    harness
        .store
        .edit::<CertificateSet>(NAMESPACE, NAME, |cs| cs.spec.argocd_cluster = true);
    harness.converge().await;
    assert_eq!(harness.issuer_names(), names(&["tenant-ca"]));
    assert!(harness.certificate_names().contains("tenant-super-admin"));

    let secret = harness.registration_secret().unwrap();
    assert_eq!(
        secret.labels().get("argocd.argoproj.io/secret-type").map(String::as_str),
        Some("cluster")
    );
    assert_eq!(
        secret
            .annotations()
            .get("certificateset.in-cloud.io/owner")
            .map(String::as_str),
        Some("clusters/tenant")
    );
    assert_eq!(secret_value(&secret, "server").as_deref(), Some(ENDPOINT));
    assert_eq!(secret_value(&secret, "name").as_deref(), Some(NAME));
}

#[tokio::test]
async fn ready_stays_false_while_a_certificate_is_not_ready() {
    let harness = Harness::with(&certificate_set(Environment::System, false, false));
    harness.run().await.unwrap();
    harness.run().await.unwrap();
    harness.backend_tick();
    harness.store.set_status::<Certificate>(
        NAMESPACE,
        "tenant-etcd",
        json!({"conditions": [{"type": "Ready", "status": "False", "reason": "Issuing"}]}),
    );

    let action = harness.run().await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(5)));
    let ready = harness.condition("Ready").unwrap();
    assert!(!ready.is_true());
    assert_eq!(ready.reason, "WaitingForResources");
    assert_eq!(ready.message, "Certificate tenant-etcd is not ready");
    assert!(harness.condition("Progressing").unwrap().is_true());
    assert!(!harness.condition("Degraded").unwrap().is_true());
}

#[tokio::test]
async fn client_set_converges_step_by_step() {
    let harness = Harness::with(&certificate_set(Environment::Client, false, false));

    assert_eq!(harness.run().await.unwrap(), Action::requeue(Duration::ZERO));
    assert!(harness.current().unwrap().status.is_none());

    assert_eq!(
        harness.run().await.unwrap(),
        Action::requeue(Duration::from_secs(5))
    );
    assert_eq!(
        harness.condition("Progressing").unwrap().message,
        "Waiting for Secret tenant-ca"
    );

    harness.backend_tick();
    assert_eq!(harness.run().await.unwrap(), Action::await_change());

    let ready = harness.condition("Ready").unwrap();
    assert!(ready.is_true());
    assert_eq!(ready.reason, "AllResourcesReady");
    assert_eq!(ready.observed_generation, Some(1));
    let degraded = harness.condition("Degraded").unwrap();
    assert_eq!(degraded.reason, "Healthy");
    assert!(harness.issuer_names().is_empty());
}

#[tokio::test]
async fn infra_kubeconfig_waits_at_each_gate() {
    let harness = Harness::with(&certificate_set(Environment::Infra, true, false));
    harness.run().await.unwrap();

    harness.run().await.unwrap();
    assert_eq!(
        harness.condition("Progressing").unwrap().message,
        "Waiting for Secret tenant-ca"
    );
    assert!(!harness.certificate_names().contains("tenant-super-admin"));

    harness.backend_tick();
    harness.run().await.unwrap();
    assert_eq!(
        harness.condition("Progressing").unwrap().message,
        "Waiting for Secret tenant-super-admin"
    );
    assert!(harness.kubeconfig_secret().is_none());

    harness.backend_tick();
    assert_eq!(harness.run().await.unwrap(), Action::await_change());
    assert!(harness.condition("Ready").unwrap().is_true());

    let oidc = harness.certificate("tenant-ca-oidc");
    assert!(!oidc.spec.is_ca);
    assert_eq!(oidc.spec.issuer_ref.name, "root");

    let super_admin = harness.certificate("tenant-super-admin");
    assert_eq!(super_admin.spec.issuer_ref.name, "tenant-ca");
    assert_eq!(super_admin.spec.issuer_ref.kind, "Issuer");

    let kubeconfig = secret_value(&harness.kubeconfig_secret().unwrap(), "value").unwrap();
    assert!(kubeconfig.contains(ENDPOINT));
}

#[tokio::test]
async fn missing_argocd_namespace_degrades_until_created() {
    let harness = Harness::with(&certificate_set(Environment::Client, false, true));
    harness.store.remove_namespace(ARGOCD_NAMESPACE);

    harness.run().await.unwrap();
    harness.run().await.unwrap();
    harness.backend_tick();
    harness.run().await.unwrap();
    harness.backend_tick();
    let err = harness.run().await.unwrap_err();

    assert_eq!(err.reason(), "ArgoCDNamespaceNotFound");
    let degraded = harness.condition("Degraded").unwrap();
    assert!(degraded.is_true());
    assert_eq!(degraded.reason, "ArgoCDNamespaceNotFound");
    assert!(!harness.condition("Ready").unwrap().is_true());

    harness.store.add_namespace(ARGOCD_NAMESPACE);
    harness.converge().await;

    assert!(harness.registration_secret().is_some());
    assert!(!harness.condition("Degraded").unwrap().is_true());
}

#[tokio::test]
async fn deletion_removes_registration_and_releases_finalizer() {
    let harness = Harness::with(&certificate_set(Environment::Client, true, true));
    harness.converge().await;
    assert!(harness.registration_secret().is_some());

    ResourceStore::delete::<CertificateSet>(&harness.store, NAMESPACE, NAME)
        .await
        .unwrap();
    assert!(harness.current().unwrap().metadata.deletion_timestamp.is_some());

    let action = harness.run().await.unwrap();

    assert_eq!(action, Action::await_change());
    assert!(harness.registration_secret().is_none());
    assert!(harness.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out_then_recovers() {
    let harness = Harness::with(&certificate_set(Environment::Client, false, false));
    harness.run().await.unwrap();
    harness.store.set_latency(Duration::from_secs(60));

    let err = harness.run().await.unwrap_err();
    assert_eq!(err.reason(), "ReconcileTimeout");

    harness.store.set_latency(Duration::ZERO);
    harness.converge().await;
    assert!(harness.condition("Ready").unwrap().is_true());
}

#[tokio::test]
async fn foreign_registration_secret_is_a_conflict() {
    let harness = Harness::with(&certificate_set(Environment::Client, false, true));
    let mut foreign = issued_secret("tenant-argocd-cluster");
    foreign.metadata.namespace = Some(ARGOCD_NAMESPACE.to_string());
    foreign.metadata.annotations = Some(BTreeMap::from([(
        "certificateset.in-cloud.io/owner".to_string(),
        "other-clusters/tenant".to_string(),
    )]));
    harness.store.insert(&foreign).unwrap();

    harness.run().await.unwrap();
    harness.run().await.unwrap();
    harness.backend_tick();
    harness.run().await.unwrap();
    harness.backend_tick();
    let err = harness.run().await.unwrap_err();

    assert_eq!(err.reason(), "ArgoCDSecretConflict");
    assert_eq!(harness.condition("Degraded").unwrap().reason, "ArgoCDSecretConflict");
    let untouched: Secret = harness.registration_secret().unwrap();
    assert_eq!(untouched.data, foreign.data);
    assert!(secret_value(&untouched, "server").is_none());
}

#[tokio::test]
async fn failed_certificate_create_backs_off_then_recovers() {
    let harness = Harness::with(&certificate_set(Environment::Client, false, false));
    harness.run().await.unwrap();
    harness
        .store
        .fail(StoreOp::Create, "Certificate", "admission webhook unavailable");

    let err = harness.run().await.unwrap_err();
    assert_eq!(err.reason(), "CACertificatesFailed");
    let degraded = harness.condition("Degraded").unwrap();
    assert!(degraded.is_true());
    assert!(degraded.message.contains("admission webhook unavailable"));

    let cs = Arc::new(harness.current().unwrap());
    let action = error_policy(Arc::clone(&cs), &err, Arc::clone(&harness.ctx));
    assert_eq!(action, Action::requeue(Duration::from_secs(60)));

    harness.store.clear_failures();
    harness.converge().await;
    assert!(harness.condition("Ready").unwrap().is_true());
    assert!(!harness.condition("Degraded").unwrap().is_true());
}

#[tokio::test]
async fn settings_come_from_the_shared_context() {
    let store = MemoryStore::new();
    store.add_namespace(NAMESPACE);
    let settings = ReconcileSettings {
        requeue_after: Duration::from_secs(42),
        ..ReconcileSettings::default()
    };
    let ctx = Arc::new(Reconciler::new(store.clone(), settings));
    let cs = store
        .insert(&certificate_set(Environment::Client, false, false))
        .unwrap();

    reconcile(Arc::new(cs), Arc::clone(&ctx)).await.unwrap();
    let cs: CertificateSet = store.object(NAMESPACE, NAME).unwrap();
    let action = reconcile(Arc::new(cs), ctx).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(42)));
}

#[tokio::test]
async fn ready_stays_false_while_the_issuer_is_not_ready() {
    let harness = Harness::with(&certificate_set(Environment::Client, true, false));
    harness.run().await.unwrap();
    harness.run().await.unwrap();
    harness.backend_tick();
    harness.run().await.unwrap();
    harness.issue_secrets();
    harness.mark_certificates_ready();

    let action = harness.run().await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(5)));
    let ready = harness.condition("Ready").unwrap();
    assert!(!ready.is_true());
    assert_eq!(ready.message, "Issuer tenant-ca is not ready");

    harness.mark_issuers_ready();
    assert_eq!(harness.run().await.unwrap(), Action::await_change());
}

#[tokio::test]
async fn failed_issuer_create_is_a_client_certificate_failure() {
    let harness = Harness::with(&certificate_set(Environment::Client, true, false));
    harness.store.fail(StoreOp::Create, "Issuer", "webhook denied");
    harness.run().await.unwrap();
    harness.run().await.unwrap();
    harness.backend_tick();

    let err = harness.run().await.unwrap_err();

    assert_eq!(err.reason(), "ClientCertificatesFailed");
    let degraded = harness.condition("Degraded").unwrap();
    assert!(degraded.is_true());
    assert_eq!(degraded.reason, "ClientCertificatesFailed");
    assert!(!harness.certificate_names().contains("tenant-super-admin"));
}

#[tokio::test]
async fn failed_kubeconfig_create_is_a_derived_secret_failure() {
    let harness = Harness::with(&certificate_set(Environment::Client, true, false));
    harness.store.fail(StoreOp::Create, "Secret", "quota exceeded");
    harness.run().await.unwrap();
    harness.run().await.unwrap();
    harness.backend_tick();
    harness.run().await.unwrap();
    harness.backend_tick();

    let err = harness.run().await.unwrap_err();

    assert_eq!(err.reason(), "DerivedSecretsFailed");
    assert_eq!(harness.condition("Degraded").unwrap().reason, "DerivedSecretsFailed");
    assert!(harness.kubeconfig_secret().is_none());
}

#[tokio::test]
async fn failed_registration_delete_is_a_cleanup_failure() {
    let harness = Harness::with(&certificate_set(Environment::Client, false, true));
    harness.converge().await;
    harness
        .store
        .edit::<CertificateSet>(NAMESPACE, NAME, |cs| cs.spec.argocd_cluster = false);
    harness.store.fail(StoreOp::Delete, "Secret", "forbidden");

    let err = harness.run().await.unwrap_err();

    assert_eq!(err.reason(), "ArgoCDCleanupFailed");
    let degraded = harness.condition("Degraded").unwrap();
    assert!(degraded.is_true());
    assert_eq!(degraded.reason, "ArgoCDCleanupFailed");
    assert!(harness.registration_secret().is_some());

    harness.store.clear_failures();
    harness.converge().await;
    assert!(harness.registration_secret().is_none());
}

#[tokio::test]
async fn failed_readiness_lookup_is_a_check_failure() {
    let harness = Harness::with(&certificate_set(Environment::Client, false, false));
    harness.run().await.unwrap();
    harness.run().await.unwrap();
    harness.backend_tick();
    // The create-if-absent lookup passes; the readiness lookup fails
    harness
        .store
        .fail_after(StoreOp::Get, "Certificate", 1, "etcdserver: request timed out");

    let err = harness.run().await.unwrap_err();

    assert_eq!(err.reason(), "CheckFailed");
    let degraded = harness.condition("Degraded").unwrap();
    assert!(degraded.is_true());
    assert_eq!(degraded.reason, "CheckFailed");
    assert!(degraded.message.contains("etcdserver: request timed out"));
    assert!(!harness.condition("Ready").unwrap().is_true());
}
