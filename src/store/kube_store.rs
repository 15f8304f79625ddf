//! # Kubernetes Store
//!
//! [`ResourceStore`] over the Kubernetes API server.

use super::{identity, ResourceStore, StoreError, StoredResource};
use crate::constants::FIELD_MANAGER;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoredResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map a client error onto the store taxonomy
fn classify<K: StoredResource>(err: kube::Error, namespace: &str, name: &str) -> StoreError {
    let kind = K::kind(&()).to_string();
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
            StoreError::AlreadyExists {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: api_err.message.clone(),
        },
        kube::Error::Api(api_err) => StoreError::Api {
            kind,
            name: name.to_string(),
            code: api_err.code,
            message: api_err.message.clone(),
        },
        other => StoreError::Api {
            kind,
            name: name.to_string(),
            code: 0,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get<K: StoredResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| classify::<K>(e, namespace, name))
    }

    async fn create<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError> {
        let (namespace, name) = identity(obj)?;
        debug!(kind = %K::kind(&()), %namespace, %name, "creating object");
        self.api::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| classify::<K>(e, &namespace, &name))
    }

    async fn replace<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError> {
        let (namespace, name) = identity(obj)?;
        debug!(kind = %K::kind(&()), %namespace, %name, "replacing object");
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| classify::<K>(e, &namespace, &name))
    }

    async fn delete<K: StoredResource>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        debug!(kind = %K::kind(&()), %namespace, %name, "deleting object");
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| classify::<K>(e, namespace, name))
    }

    async fn patch_metadata<K: StoredResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError> {
        debug!(kind = %K::kind(&()), %namespace, %name, "patching metadata");
        self.api::<K>(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| classify::<K>(e, namespace, name))
    }

    async fn patch_status<K: StoredResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.api::<K>(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| classify::<K>(e, namespace, name))
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, StoreError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        match namespaces.get_opt(name).await {
            Ok(found) => Ok(found.is_some()),
            Err(kube::Error::Api(api_err)) => Err(StoreError::Api {
                kind: "Namespace".to_string(),
                name: name.to_string(),
                code: api_err.code,
                message: api_err.message.clone(),
            }),
            Err(other) => Err(StoreError::Api {
                kind: "Namespace".to_string(),
                name: name.to_string(),
                code: 0,
                message: other.to_string(),
            }),
        }
    }
}
