//! # Cleanup
//!
//! Finalizer handling and removal of children the current flags no longer call for.
//!
//! The ArgoCD registration secret lives in another namespace, outside owner-reference
//! garbage collection, so it is removed here both on drift and on deletion. Finalizers
//! are changed with a metadata merge patch built from a fresh read, never with a
//! replace of the watched object, so a stale copy cannot fail the attempt.

use crate::constants::{FINALIZER_NAME, REGISTRATION_OWNER_ANNOTATION};
use crate::controller::builders::{names, registration_owner};
use crate::crd::{Certificate, CertificateSet, Issuer};
use crate::store::{ResourceStore, StoreError, StoredResource};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde_json::json;
use tracing::{info, warn};

#[must_use]
pub fn has_finalizer(cs: &CertificateSet) -> bool {
    cs.finalizers().iter().any(|f| f == FINALIZER_NAME)
}

/// Owner recorded on a registration secret when it is not `cs`
#[must_use]
pub fn foreign_owner(secret: &Secret, cs: &CertificateSet) -> Option<String> {
    secret
        .annotations()
        .get(REGISTRATION_OWNER_ANNOTATION)
        .filter(|owner| **owner != registration_owner(cs))
        .cloned()
}

/// Current finalizers of the stored CertificateSet; `None` once it is gone
async fn stored_finalizers<S: ResourceStore>(
    store: &S,
    cs: &CertificateSet,
) -> Result<Option<Vec<String>>, StoreError> {
    let namespace = cs.namespace().unwrap_or_default();
    let current: Option<CertificateSet> = store.get(&namespace, &cs.name_any()).await?;
    Ok(current.map(|c| c.metadata.finalizers.unwrap_or_default()))
}

async fn patch_finalizers<S: ResourceStore>(
    store: &S,
    cs: &CertificateSet,
    finalizers: &[String],
) -> Result<(), StoreError> {
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    store
        .patch_metadata::<CertificateSet>(&cs.namespace().unwrap_or_default(), &cs.name_any(), &patch)
        .await
}

pub async fn attach_finalizer<S: ResourceStore>(
    store: &S,
    cs: &CertificateSet,
) -> Result<(), StoreError> {
    let Some(mut finalizers) = stored_finalizers(store, cs).await? else {
        return Ok(());
    };
    if finalizers.iter().any(|f| f == FINALIZER_NAME) {
        return Ok(());
    }
    finalizers.push(FINALIZER_NAME.to_string());
    patch_finalizers(store, cs, &finalizers).await?;
    info!("attached finalizer {FINALIZER_NAME}");
    Ok(())
}

/// Delete an object, treating not-found as already done; returns whether it existed
async fn delete_if_present<S: ResourceStore, K: StoredResource>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<bool, StoreError> {
    match store.delete::<K>(namespace, name).await {
        Ok(()) => {
            info!(kind = %K::kind(&()), %namespace, %name, "deleted child resource");
            Ok(true)
        }
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete `<name>-argocd-cluster` from the ArgoCD namespace
///
/// Returns whether a secret was deleted. A missing secret, or one registered
/// by another CertificateSet, is left alone.
pub async fn cleanup<S: ResourceStore>(
    store: &S,
    cs: &CertificateSet,
    argocd_namespace: &str,
) -> Result<bool, StoreError> {
    let name = names::argocd_cluster_name(cs);
    let Some(secret) = store.get::<Secret>(argocd_namespace, &name).await? else {
        return Ok(false);
    };
    if let Some(owner) = foreign_owner(&secret, cs) {
        warn!(secret = %name, %owner, "registration secret belongs to another CertificateSet, not deleting");
        return Ok(false);
    }
    delete_if_present::<S, Secret>(store, argocd_namespace, &name).await
}

/// Delete the super-admin Certificate and the `<name>-ca` Issuer
///
/// Called once neither kubeconfig nor ArgoCD output is wanted. The issued
/// super-admin Secret is left to cert-manager. Returns whether anything was deleted.
pub async fn remove_client_credentials<S: ResourceStore>(
    store: &S,
    cs: &CertificateSet,
) -> Result<bool, StoreError> {
    let namespace = cs.namespace().unwrap_or_default();
    let certificate =
        delete_if_present::<S, Certificate>(store, &namespace, &names::super_admin_name(cs)).await?;
    let issuer = delete_if_present::<S, Issuer>(store, &namespace, &names::ca_name(cs)).await?;
    Ok(certificate || issuer)
}

/// Clean up and release the finalizer so deletion can complete
pub async fn finalize<S: ResourceStore>(
    store: &S,
    cs: &CertificateSet,
    argocd_namespace: &str,
) -> Result<(), StoreError> {
    cleanup(store, cs, argocd_namespace).await?;

    let Some(finalizers) = stored_finalizers(store, cs).await? else {
        return Ok(());
    };
    if finalizers.iter().any(|f| f == FINALIZER_NAME) {
        let remaining: Vec<String> = finalizers
            .into_iter()
            .filter(|f| f != FINALIZER_NAME)
            .collect();
        patch_finalizers(store, cs, &remaining).await?;
        info!("removed finalizer {FINALIZER_NAME}");
    }
    Ok(())
}
