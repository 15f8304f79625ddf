//! # Reconcile
//!
//! One reconciliation attempt of a CertificateSet.
//!
//! Phases run in dependency order and stop at the first gate whose input the
//! issuance backend has not produced yet:
//!
//! 1. CA certificates (plus etcd / proxy / OIDC for `system` and `infra`)
//! 2. gate on the `<name>-ca` secret
//! 3. CA issuer and super-admin certificate, when kubeconfig or ArgoCD output is wanted
//! 4. gate on the `<name>-super-admin` secret
//! 5. kubeconfig secret and ArgoCD cluster secret
//! 6. removal of a stale ArgoCD cluster secret, and of the issuer and super-admin
//!    certificate once no derived secret is wanted
//! 7. readiness of every certificate and the issuer
//!
//! The attempt is bounded by `reconcile_timeout`; conditions are committed once at the end.

use super::apply::{apply, Apply, ApplyOutcome};
use super::cleanup;
use super::readiness::{certificate_ready, credential_bundle, issuer_ready, secret_ready};
use super::status::StatusDelta;
use super::types::{ReconcileError, ReconcileSettings, Reconciler, TriggerSource};
use crate::controller::builders::{
    all_certificate_names, build_argocd_cluster_secret, build_issuer, build_kubeconfig_secret,
    build_super_admin_certificate, ca_phase_certificates, names, ApplyPolicy, CredentialBundle,
    ARGOCD_SECRET_POLICY, CERTIFICATE_POLICY, ISSUER_POLICY, KUBECONFIG_SECRET_POLICY,
};
use crate::crd::CertificateSet;
use crate::observability::metrics;
use crate::store::{ResourceStore, StoreError};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};

/// Where an attempt stopped, short of failing
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    /// Finalizer added; the change re-triggers reconciliation
    FinalizerAttached,
    /// Cleanup done and finalizer released
    Finalized,
    /// The backend has not produced something yet; the message names it
    Waiting(String),
    /// Every required resource is ready
    Converged,
}

/// `namespace/name`, the per-resource key for backoff and metrics
#[must_use]
pub fn resource_key(cs: &CertificateSet) -> String {
    format!("{}/{}", cs.namespace().unwrap_or_default(), cs.name_any())
}

/// Reconcile a CertificateSet
///
/// # Errors
///
/// Returns the [`ReconcileError`] of the failing phase, after recording it on the
/// Degraded condition.
pub async fn reconcile<S: ResourceStore>(
    cs: Arc<CertificateSet>,
    ctx: Arc<Reconciler<S>>,
) -> Result<Action, ReconcileError> {
    let span = info_span!(
        "reconcile",
        resource.name = %cs.name_any(),
        resource.namespace = %cs.namespace().unwrap_or_default(),
        generation = cs.metadata.generation.unwrap_or(0),
    );
    reconcile_attempt(&cs, &ctx).instrument(span).await
}

async fn reconcile_attempt<S: ResourceStore>(
    cs: &CertificateSet,
    ctx: &Reconciler<S>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    metrics::increment_reconciliations();

    let key = resource_key(cs);
    let settings = &ctx.settings;
    let mut delta = StatusDelta::new(cs);

    let outcome = timeout(settings.reconcile_timeout, run_phases(&ctx.store, settings, cs))
        .await
        .unwrap_or(Err(ReconcileError::Timeout(settings.reconcile_timeout)));

    let result = match outcome {
        Ok(Outcome::FinalizerAttached) => {
            metrics::increment_requeues(TriggerSource::FinalizerAttached.as_str());
            Ok(Action::requeue(Duration::ZERO))
        }
        Ok(Outcome::Finalized) => {
            metrics::set_converged(&key, false);
            Ok(Action::await_change())
        }
        Ok(Outcome::Waiting(message)) => {
            info!(%message, "waiting for resources");
            delta.mark_waiting(&message);
            metrics::set_converged(&key, false);
            commit(ctx, cs, &delta).await.map(|()| {
                metrics::increment_requeues(TriggerSource::WaitingForResource.as_str());
                Action::requeue(settings.requeue_after)
            })
        }
        Ok(Outcome::Converged) => {
            delta.mark_converged();
            commit(ctx, cs, &delta).await.map(|()| {
                metrics::set_converged(&key, true);
                debug!("all resources ready");
                Action::await_change()
            })
        }
        Err(error) => {
            delta.mark_failed(error.reason(), &error.to_string());
            metrics::set_converged(&key, false);
            if let Err(status_error) = commit(ctx, cs, &delta).await {
                warn!(error = %status_error, "failed to record Degraded condition");
            }
            Err(error)
        }
    };

    if result.is_ok() {
        ctx.reset_backoff(&key);
    }
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    result
}

async fn commit<S: ResourceStore>(
    ctx: &Reconciler<S>,
    cs: &CertificateSet,
    delta: &StatusDelta,
) -> Result<(), ReconcileError> {
    let limit = ctx.settings.reconcile_timeout;
    match timeout(limit, delta.commit(&ctx.store, cs)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(ReconcileError::Status(e)),
        Err(_) => Err(ReconcileError::Timeout(limit)),
    }
}

async fn run_phases<S: ResourceStore>(
    store: &S,
    settings: &ReconcileSettings,
    cs: &CertificateSet,
) -> Result<Outcome, ReconcileError> {
    let namespace = cs.namespace().ok_or(ReconcileError::MissingNamespace)?;

    if cs.is_deleting() {
        cleanup::finalize(store, cs, &settings.argocd_namespace)
            .await
            .map_err(ReconcileError::Cleanup)?;
        return Ok(Outcome::Finalized);
    }
    if !cleanup::has_finalizer(cs) {
        cleanup::attach_finalizer(store, cs)
            .await
            .map_err(ReconcileError::Finalizer)?;
        return Ok(Outcome::FinalizerAttached);
    }

    for certificate in ca_phase_certificates(cs) {
        apply_child(store, &certificate, CERTIFICATE_POLICY)
            .await
            .map_err(ReconcileError::CaCertificates)?;
    }
    let ca_secret = names::ca_name(cs);
    if !secret_ready(store, &namespace, &ca_secret)
        .await
        .map_err(ReconcileError::ReadinessCheck)?
    {
        return Ok(Outcome::Waiting(format!("Waiting for Secret {ca_secret}")));
    }

    if cs.needs_client_certificates() {
        apply_child(store, &build_issuer(cs), ISSUER_POLICY)
            .await
            .map_err(ReconcileError::ClientCertificates)?;
        apply_child(
            store,
            &build_super_admin_certificate(cs, &ca_secret),
            CERTIFICATE_POLICY,
        )
        .await
        .map_err(ReconcileError::ClientCertificates)?;

        let super_admin = names::super_admin_name(cs);
        if !secret_ready(store, &namespace, &super_admin)
            .await
            .map_err(ReconcileError::ReadinessCheck)?
        {
            return Ok(Outcome::Waiting(format!("Waiting for Secret {super_admin}")));
        }

        let bundle = credential_bundle(store, &namespace, &super_admin)
            .await
            .map_err(ReconcileError::DerivedSecrets)?;
        if cs.spec.kubeconfig {
            let secret = build_kubeconfig_secret(cs, &bundle).map_err(ReconcileError::Render)?;
            apply_child(store, &secret, KUBECONFIG_SECRET_POLICY)
                .await
                .map_err(ReconcileError::DerivedSecrets)?;
        }
        if cs.spec.argocd_cluster {
            register_cluster(store, &settings.argocd_namespace, cs, &bundle).await?;
        }
    }

    if !cs.spec.argocd_cluster {
        cleanup::cleanup(store, cs, &settings.argocd_namespace)
            .await
            .map_err(ReconcileError::ArgoCdCleanup)?;
    }
    if !cs.needs_client_certificates() {
        cleanup::remove_client_credentials(store, cs)
            .await
            .map_err(ReconcileError::ArgoCdCleanup)?;
    }

    for name in all_certificate_names(cs) {
        if !certificate_ready(store, &namespace, &name)
            .await
            .map_err(ReconcileError::ReadinessCheck)?
        {
            return Ok(Outcome::Waiting(format!("Certificate {name} is not ready")));
        }
    }
    if cs.needs_client_certificates()
        && !issuer_ready(store, &namespace, &ca_secret)
            .await
            .map_err(ReconcileError::ReadinessCheck)?
    {
        return Ok(Outcome::Waiting(format!("Issuer {ca_secret} is not ready")));
    }

    Ok(Outcome::Converged)
}

/// Write the ArgoCD cluster secret into the ArgoCD namespace
async fn register_cluster<S: ResourceStore>(
    store: &S,
    argocd_namespace: &str,
    cs: &CertificateSet,
    bundle: &CredentialBundle,
) -> Result<(), ReconcileError> {
    if !store
        .namespace_exists(argocd_namespace)
        .await
        .map_err(ReconcileError::DerivedSecrets)?
    {
        return Err(ReconcileError::ArgoCdNamespaceNotFound(
            argocd_namespace.to_string(),
        ));
    }

    let secret = build_argocd_cluster_secret(cs, bundle, argocd_namespace)
        .map_err(ReconcileError::Render)?;
    let name = names::argocd_cluster_name(cs);
    let existing: Option<Secret> = store
        .get(argocd_namespace, &name)
        .await
        .map_err(ReconcileError::DerivedSecrets)?;
    if let Some(owner) = existing.and_then(|s| cleanup::foreign_owner(&s, cs)) {
        return Err(ReconcileError::RegistrationConflict {
            secret: name,
            owner,
        });
    }

    apply_child(store, &secret, ARGOCD_SECRET_POLICY)
        .await
        .map_err(ReconcileError::DerivedSecrets)?;
    Ok(())
}

async fn apply_child<S: ResourceStore, K: Apply>(
    store: &S,
    desired: &K,
    policy: ApplyPolicy,
) -> Result<ApplyOutcome, StoreError> {
    let outcome = apply(store, desired, policy).await?;
    if outcome == ApplyOutcome::Created {
        metrics::increment_children_created(&K::kind(&()));
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FINALIZER_NAME;
    use crate::crd::{CertificateSetSpec, Environment, IssuerReference};
    use crate::store::MemoryStore;

    fn certificate_set() -> CertificateSet {
        let mut cs = CertificateSet::new(
            "tenant",
            CertificateSetSpec {
                argocd_cluster: false,
                environment: Environment::Client,
                kubeconfig: false,
                issuer_ref: IssuerReference {
                    api_version: "cert-manager.io/v1".to_string(),
                    kind: "ClusterIssuer".to_string(),
                    name: "root".to_string(),
                },
                issuer_ref_oidc: None,
                kubeconfig_endpoint: String::new(),
            },
        );
        cs.metadata.namespace = Some("clusters".to_string());
        cs
    }

    fn context(store: MemoryStore) -> Arc<Reconciler<MemoryStore>> {
        Arc::new(Reconciler::new(store, ReconcileSettings::default()))
    }

    #[tokio::test]
    async fn first_pass_only_attaches_finalizer() {
        let store = MemoryStore::new();
        let cs = store.insert(&certificate_set()).unwrap();

        let action = reconcile(Arc::new(cs), context(store.clone())).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::ZERO));

        let stored: CertificateSet = store.object("clusters", "tenant").unwrap();
        assert_eq!(stored.finalizers(), [FINALIZER_NAME.to_string()]);
        assert!(stored.status.is_none());
        assert!(store.list::<crate::crd::Certificate>("clusters").is_empty());
    }

    #[tokio::test]
    async fn missing_namespace_is_invalid() {
        let mut cs = certificate_set();
        cs.metadata.namespace = None;

        let err = reconcile(Arc::new(cs), context(MemoryStore::new()))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "InvalidResource");
    }

    #[test]
    fn key_is_namespace_and_name() {
        assert_eq!(resource_key(&certificate_set()), "clusters/tenant");
    }
}
