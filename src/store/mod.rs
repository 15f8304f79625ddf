//! # Resource Store
//!
//! Typed access to the objects the controller reads and writes.
//!
//! The reconciler never talks to `kube::Api` directly; it goes through
//! [`ResourceStore`], which has two implementations:
//!
//! - [`KubeStore`] - backed by the Kubernetes API server
//! - [`MemoryStore`] - in-process store that emulates the API server semantics
//!   the reconciler depends on (finalizers, status subresource, resource versions)

mod kube_store;
pub mod memory;

pub use kube_store::KubeStore;
pub use memory::{MemoryStore, StoreOp};

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// A namespaced object the store can hold
pub trait StoredResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoredResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("conflict writing {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },
    #[error("API error ({code}) on {kind} {name}: {message}")]
    Api {
        kind: String,
        name: String,
        code: u16,
        message: String,
    },
    #[error("{kind} has no {field}")]
    MissingField { kind: String, field: &'static str },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Get / create / replace / delete / patch over namespaced objects,
/// plus the one cluster-scoped lookup the controller needs (namespace existence).
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch an object. A missing object is `Ok(None)`, never an error.
    async fn get<K: StoredResource>(&self, namespace: &str, name: &str)
        -> Result<Option<K>, StoreError>;

    /// Create an object. Fails with [`StoreError::AlreadyExists`] if the name is taken.
    async fn create<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an object (main resource only; status is left untouched).
    async fn replace<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError>;

    /// Delete an object. Fails with [`StoreError::NotFound`] if it does not exist.
    async fn delete<K: StoredResource>(&self, namespace: &str, name: &str)
        -> Result<(), StoreError>;

    /// Apply a JSON merge patch to the main resource, without a resourceVersion precondition.
    /// Used for `metadata.finalizers`.
    async fn patch_metadata<K: StoredResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Apply a JSON merge patch to the status subresource.
    async fn patch_status<K: StoredResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn namespace_exists(&self, name: &str) -> Result<bool, StoreError>;
}

/// Identity of an object for error messages
pub(crate) fn identity<K: StoredResource>(obj: &K) -> Result<(String, String), StoreError> {
    let kind = K::kind(&()).to_string();
    let name = obj.meta().name.clone().ok_or_else(|| StoreError::MissingField {
        kind: kind.clone(),
        field: "metadata.name",
    })?;
    let namespace = obj
        .meta()
        .namespace
        .clone()
        .ok_or(StoreError::MissingField {
            kind,
            field: "metadata.namespace",
        })?;
    Ok((namespace, name))
}
