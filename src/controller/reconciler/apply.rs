//! # Apply
//!
//! Writes a desired child according to its kind's [`ApplyPolicy`].

use crate::constants::REGISTRATION_OWNER_ANNOTATION;
use crate::controller::builders::ApplyPolicy;
use crate::crd::{Certificate, Issuer};
use crate::store::{ResourceStore, StoreError, StoredResource};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

/// A child kind the reconciler can apply
pub trait Apply: StoredResource {
    /// Copy the fields `policy` manages from `self` onto `existing`.
    /// Returns whether `existing` changed.
    fn merge_into(&self, existing: &mut Self, policy: ApplyPolicy) -> bool;
}

fn merge_metadata(desired: &ObjectMeta, existing: &mut ObjectMeta) -> bool {
    let mut changed = false;
    if desired.labels != existing.labels {
        existing.labels.clone_from(&desired.labels);
        changed = true;
    }
    if desired.annotations != existing.annotations {
        existing.annotations.clone_from(&desired.annotations);
        changed = true;
    }
    changed
}

/// Carry the registration owner annotation onto an adopted object that lacks it
fn stamp_owner(desired: &ObjectMeta, existing: &mut ObjectMeta) -> bool {
    let Some(owner) = desired
        .annotations
        .as_ref()
        .and_then(|a| a.get(REGISTRATION_OWNER_ANNOTATION))
    else {
        return false;
    };
    let annotations = existing.annotations.get_or_insert_with(Default::default);
    if annotations.get(REGISTRATION_OWNER_ANNOTATION) == Some(owner) {
        return false;
    }
    annotations.insert(REGISTRATION_OWNER_ANNOTATION.to_string(), owner.clone());
    true
}

impl Apply for Certificate {
    fn merge_into(&self, existing: &mut Self, policy: ApplyPolicy) -> bool {
        if policy == ApplyPolicy::CreateIfAbsent {
            return false;
        }
        let mut changed = merge_metadata(&self.metadata, &mut existing.metadata);
        if self.spec != existing.spec {
            existing.spec = self.spec.clone();
            changed = true;
        }
        changed
    }
}

impl Apply for Issuer {
    fn merge_into(&self, existing: &mut Self, policy: ApplyPolicy) -> bool {
        if policy == ApplyPolicy::CreateIfAbsent {
            return false;
        }
        let mut changed = merge_metadata(&self.metadata, &mut existing.metadata);
        if self.spec != existing.spec {
            existing.spec = self.spec.clone();
            changed = true;
        }
        changed
    }
}

impl Apply for Secret {
    fn merge_into(&self, existing: &mut Self, policy: ApplyPolicy) -> bool {
        match policy {
            ApplyPolicy::CreateIfAbsent => false,
            ApplyPolicy::CreateOrUpdate => {
                let mut changed = merge_metadata(&self.metadata, &mut existing.metadata);
                if self.data != existing.data || self.type_ != existing.type_ {
                    existing.data.clone_from(&self.data);
                    existing.type_.clone_from(&self.type_);
                    changed = true;
                }
                changed
            }
            ApplyPolicy::CreateOrUpdateManagedFields(keys) => {
                let stamped = stamp_owner(&self.metadata, &mut existing.metadata);
                let desired = self.data.clone().unwrap_or_default();
                let current = existing.data.get_or_insert_with(Default::default);
                let mut changed = false;
                for key in keys {
                    let wanted = desired.get(*key);
                    if current.get(*key) != wanted {
                        match wanted {
                            Some(value) => current.insert((*key).to_string(), value.clone()),
                            None => current.remove(*key),
                        };
                        changed = true;
                    }
                }
                changed || stamped
            }
        }
    }
}

/// Create `desired` if missing, otherwise update it as `policy` allows
///
/// # Errors
///
/// Returns the store error of the failing call.
pub async fn apply<S, K>(store: &S, desired: &K, policy: ApplyPolicy) -> Result<ApplyOutcome, StoreError>
where
    S: ResourceStore,
    K: Apply,
{
    let kind = K::kind(&());
    let namespace = desired.meta().namespace.clone().unwrap_or_default();
    let name = desired.meta().name.clone().unwrap_or_default();

    let Some(existing) = store.get::<K>(&namespace, &name).await? else {
        return match store.create(desired).await {
            Ok(_) => {
                info!(%kind, %namespace, %name, "created child resource");
                Ok(ApplyOutcome::Created)
            }
            // Created concurrently; existing objects are left alone under this policy
            Err(e) if e.is_already_exists() && policy == ApplyPolicy::CreateIfAbsent => {
                Ok(ApplyOutcome::Unchanged)
            }
            Err(e) => Err(e),
        };
    };

    let mut updated = existing;
    if desired.merge_into(&mut updated, policy) {
        store.replace(&updated).await?;
        info!(%kind, %namespace, %name, "updated child resource");
        Ok(ApplyOutcome::Updated)
    } else {
        debug!(%kind, %namespace, %name, "child resource up to date");
        Ok(ApplyOutcome::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreOp};
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn secret(entries: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("tenant-kubeconfig".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(
                entries
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    fn value(store: &MemoryStore, key: &str) -> Option<String> {
        let secret: Secret = store.object("ns", "tenant-kubeconfig")?;
        let bytes = secret.data?.get(key)?.0.clone();
        String::from_utf8(bytes).ok()
    }

    #[tokio::test]
    async fn creates_missing_object() {
        let store = MemoryStore::new();
        let outcome = apply(&store, &secret(&[("value", "a")]), ApplyPolicy::CreateIfAbsent)
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Created);
        assert_eq!(value(&store, "value").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn create_if_absent_leaves_existing_object() {
        let store = MemoryStore::new();
        store.insert(&secret(&[("value", "old")])).unwrap();

        let outcome = apply(&store, &secret(&[("value", "new")]), ApplyPolicy::CreateIfAbsent)
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(value(&store, "value").as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn managed_fields_preserve_foreign_keys() {
        let store = MemoryStore::new();
        store
            .insert(&secret(&[("value", "old"), ("extra", "kept")]))
            .unwrap();
        let policy = ApplyPolicy::CreateOrUpdateManagedFields(&["value"]);

        let outcome = apply(&store, &secret(&[("value", "new")]), policy).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);
        assert_eq!(value(&store, "value").as_deref(), Some("new"));
        assert_eq!(value(&store, "extra").as_deref(), Some("kept"));

        store.clear_writes();
        let outcome = apply(&store, &secret(&[("value", "new")]), policy).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn adopted_secret_is_stamped_with_owner() {
        let store = MemoryStore::new();
        store.insert(&secret(&[("value", "same")])).unwrap();
        let mut desired = secret(&[("value", "same")]);
        desired.metadata.annotations = Some(BTreeMap::from([(
            REGISTRATION_OWNER_ANNOTATION.to_string(),
            "clusters/tenant".to_string(),
        )]));
        let policy = ApplyPolicy::CreateOrUpdateManagedFields(&["value"]);

        let outcome = apply(&store, &desired, policy).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);
        let stored: Secret = store.object("ns", "tenant-kubeconfig").unwrap();
        assert_eq!(
            stored
                .metadata
                .annotations
                .unwrap_or_default()
                .get(REGISTRATION_OWNER_ANNOTATION)
                .map(String::as_str),
            Some("clusters/tenant")
        );

        let outcome = apply(&store, &desired, policy).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
    }

    #[tokio::test]
    async fn create_or_update_overwrites_whole_payload() {
        let store = MemoryStore::new();
        store
            .insert(&secret(&[("value", "old"), ("extra", "dropped")]))
            .unwrap();

        let outcome = apply(&store, &secret(&[("value", "new")]), ApplyPolicy::CreateOrUpdate)
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);
        assert_eq!(value(&store, "extra"), None);
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let store = MemoryStore::new();
        store.fail(StoreOp::Create, "Secret", "quota exceeded");

        let err = apply(&store, &secret(&[("value", "a")]), ApplyPolicy::CreateOrUpdate)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { .. }));
    }
}
