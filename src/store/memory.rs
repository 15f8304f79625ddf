//! # In-Memory Store
//!
//! A [`ResourceStore`] that keeps objects as JSON in process memory.
//!
//! Emulates the API server behavior the reconciler relies on:
//! - `create` rejects taken names, `delete` rejects missing ones
//! - `replace` never touches status, bumps `metadata.generation` when `spec` changes,
//!   and rejects a stale `resourceVersion`
//! - deleting an object with finalizers only stamps `deletionTimestamp`; the object
//!   disappears once a replace clears its finalizers
//! - `patch_metadata` merge-patches `metadata` without a resourceVersion check; clearing
//!   the finalizers of a deleting object removes it
//! - `patch_status` applies a JSON merge patch to the status subresource
//!
//! Test hooks allow seeding objects, simulating the issuance backend by writing
//! status directly, injecting failures and latency, and inspecting the write log.

use super::{identity, ResourceStore, StoreError, StoredResource};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Store operation, used for failure injection and the write log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Create,
    Replace,
    Delete,
    PatchMetadata,
    PatchStatus,
}

/// One mutating call observed by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub op: StoreOp,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

type ObjectKey = (String, String, String);

/// An injected failure, preceded by `passes` calls that still succeed
#[derive(Debug, Clone)]
struct Failure {
    message: String,
    passes: usize,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    namespaces: BTreeSet<String>,
    next_version: u64,
    writes: Vec<RecordedWrite>,
    failures: HashMap<(StoreOp, String), Failure>,
    latency: Duration,
}

impl State {
    fn next_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn check_failure(&mut self, op: StoreOp, kind: &str, name: &str) -> Result<(), StoreError> {
        match self.failures.get_mut(&(op, kind.to_string())) {
            Some(failure) if failure.passes > 0 => {
                failure.passes -= 1;
                Ok(())
            }
            Some(failure) => Err(StoreError::Api {
                kind: kind.to_string(),
                name: name.to_string(),
                code: 500,
                message: failure.message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn record(&mut self, op: StoreOp, kind: &str, namespace: &str, name: &str) {
        self.writes.push(RecordedWrite {
            op,
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }

    /// Stamp server-populated metadata on a new object and store it
    fn admit(&mut self, key: ObjectKey, mut value: Value) -> Value {
        let version = self.next_version();
        if let Some(meta) = metadata(&mut value) {
            meta.insert("uid".to_string(), Value::String(format!("uid-{version}")));
            meta.insert("resourceVersion".to_string(), Value::String(version));
            meta.insert("generation".to_string(), Value::from(1));
            meta.insert("creationTimestamp".to_string(), Value::String(now()));
        }
        self.objects.insert(key, value.clone());
        value
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn add_namespace(&self, name: &str) {
        self.lock().namespaces.insert(name.to_string());
    }

    pub fn remove_namespace(&self, name: &str) {
        self.lock().namespaces.remove(name);
    }

    /// Make every `op` on `kind` fail with a 500 until cleared
    pub fn fail(&self, op: StoreOp, kind: &str, message: &str) {
        self.fail_after(op, kind, 0, message);
    }

    /// Let the next `passes` calls of `op` on `kind` through, then fail like [`MemoryStore::fail`]
    pub fn fail_after(&self, op: StoreOp, kind: &str, passes: usize, message: &str) {
        self.lock().failures.insert(
            (op, kind.to_string()),
            Failure {
                message: message.to_string(),
                passes,
            },
        );
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Delay every store call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Every mutating call in order
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Seed an object, status included, as if created earlier
    ///
    /// # Errors
    ///
    /// Returns an error if the object has no name or namespace or fails to serialize.
    pub fn insert<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError> {
        let (namespace, name) = identity(obj)?;
        let value = serde_json::to_value(obj)?;
        let key = (K::kind(&()).to_string(), namespace, name);
        let stored = self.lock().admit(key, value);
        Ok(serde_json::from_value(stored)?)
    }

    /// Read an object without going through the async API
    #[must_use]
    pub fn object<K: StoredResource>(&self, namespace: &str, name: &str) -> Option<K> {
        let key = key::<K>(namespace, name);
        let value = self.lock().objects.get(&key).cloned()?;
        serde_json::from_value(value).ok()
    }

    /// All objects of a kind in a namespace, ordered by name
    #[must_use]
    pub fn list<K: StoredResource>(&self, namespace: &str) -> Vec<K> {
        let kind = K::kind(&()).to_string();
        self.lock()
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .filter_map(|(_, value)| serde_json::from_value(value.clone()).ok())
            .collect()
    }

    /// Overwrite an object's status wholesale, as a backend controller would
    pub fn set_status<K: StoredResource>(&self, namespace: &str, name: &str, status: Value) {
        let key = key::<K>(namespace, name);
        let mut state = self.lock();
        let version = state.next_version();
        if let Some(value) = state.objects.get_mut(&key) {
            if let Some(object) = value.as_object_mut() {
                object.insert("status".to_string(), status);
            }
            if let Some(meta) = metadata(value) {
                meta.insert("resourceVersion".to_string(), Value::String(version));
            }
        }
    }

    /// Apply a user edit to a stored object, bumping generation when the spec changes
    pub fn edit<K: StoredResource>(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut K)) {
        let key = key::<K>(namespace, name);
        let mut state = self.lock();
        let Some(current) = state.objects.get(&key).cloned() else {
            return;
        };
        let Ok(mut obj) = serde_json::from_value::<K>(current.clone()) else {
            return;
        };
        edit(&mut obj);
        let Ok(mut updated) = serde_json::to_value(&obj) else {
            return;
        };
        let version = state.next_version();
        let spec_changed = current.get("spec") != updated.get("spec");
        if let Some(meta) = metadata(&mut updated) {
            meta.insert("resourceVersion".to_string(), Value::String(version));
            if spec_changed {
                meta.insert("generation".to_string(), Value::from(generation(&current) + 1));
            }
        }
        state.objects.insert(key, updated);
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get<K: StoredResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        self.delay().await;
        let mut state = self.lock();
        let kind = K::kind(&());
        state.check_failure(StoreOp::Get, &kind, name)?;
        match state.objects.get(&key::<K>(namespace, name)) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    async fn create<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError> {
        self.delay().await;
        let (namespace, name) = identity(obj)?;
        let kind = K::kind(&()).to_string();
        let mut value = serde_json::to_value(obj)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("status");
        }

        let mut state = self.lock();
        state.check_failure(StoreOp::Create, &kind, &name)?;
        let key = (kind.clone(), namespace.clone(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind,
                namespace,
                name,
            });
        }
        state.record(StoreOp::Create, &kind, &namespace, &name);
        let stored = state.admit(key, value);
        Ok(serde_json::from_value(stored)?)
    }

    async fn replace<K: StoredResource>(&self, obj: &K) -> Result<K, StoreError> {
        self.delay().await;
        let (namespace, name) = identity(obj)?;
        let kind = K::kind(&()).to_string();
        let mut value = serde_json::to_value(obj)?;

        let mut state = self.lock();
        state.check_failure(StoreOp::Replace, &kind, &name)?;
        let key = (kind.clone(), namespace.clone(), name.clone());
        let Some(current) = state.objects.get(&key).cloned() else {
            return Err(StoreError::NotFound {
                kind,
                namespace,
                name,
            });
        };

        let expected = resource_version(&value);
        if expected.is_some() && expected != resource_version(&current) {
            return Err(StoreError::Conflict {
                kind,
                namespace,
                name,
                message: "the object has been modified".to_string(),
            });
        }

        // Status and deletion state belong to the server
        if let Some(object) = value.as_object_mut() {
            match current.get("status") {
                Some(status) => object.insert("status".to_string(), status.clone()),
                None => object.remove("status"),
            };
        }
        let deleting = current.pointer("/metadata/deletionTimestamp").cloned();
        let spec_changed = current.get("spec") != value.get("spec");
        let version = state.next_version();
        if let Some(meta) = metadata(&mut value) {
            meta.insert("resourceVersion".to_string(), Value::String(version));
            let next_generation = if spec_changed {
                generation(&current) + 1
            } else {
                generation(&current)
            };
            meta.insert("generation".to_string(), Value::from(next_generation));
            if let Some(ts) = &deleting {
                meta.insert("deletionTimestamp".to_string(), ts.clone());
            }
        }

        state.record(StoreOp::Replace, &kind, &namespace, &name);
        if deleting.is_some() && !has_finalizers(&value) {
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, value.clone());
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn delete<K: StoredResource>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.delay().await;
        let kind = K::kind(&()).to_string();
        let mut state = self.lock();
        state.check_failure(StoreOp::Delete, &kind, name)?;
        let key = key::<K>(namespace, name);
        let Some(current) = state.objects.get(&key).cloned() else {
            return Err(StoreError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };

        state.record(StoreOp::Delete, &kind, namespace, name);
        if has_finalizers(&current) {
            let version = state.next_version();
            if let Some(value) = state.objects.get_mut(&key) {
                if let Some(meta) = metadata(value) {
                    meta.entry("deletionTimestamp")
                        .or_insert_with(|| Value::String(now()));
                    meta.insert("resourceVersion".to_string(), Value::String(version));
                }
            }
        } else {
            state.objects.remove(&key);
        }
        Ok(())
    }

    async fn patch_metadata<K: StoredResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), StoreError> {
        self.delay().await;
        let kind = K::kind(&()).to_string();
        let mut state = self.lock();
        state.check_failure(StoreOp::PatchMetadata, &kind, name)?;
        let key = key::<K>(namespace, name);
        let version = state.next_version();
        let Some(value) = state.objects.get_mut(&key) else {
            return Err(StoreError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };

        if let Some(meta_patch) = patch.get("metadata") {
            if let Some(meta) = metadata(value) {
                let mut merged = Value::Object(std::mem::take(meta));
                merge_patch(&mut merged, meta_patch);
                if let Value::Object(map) = merged {
                    *meta = map;
                }
            }
        }
        if let Some(meta) = metadata(value) {
            meta.insert("resourceVersion".to_string(), Value::String(version));
        }
        let released = value.pointer("/metadata/deletionTimestamp").is_some() && !has_finalizers(value);

        state.record(StoreOp::PatchMetadata, &kind, namespace, name);
        if released {
            state.objects.remove(&key);
        }
        Ok(())
    }

    async fn patch_status<K: StoredResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), StoreError> {
        self.delay().await;
        let kind = K::kind(&()).to_string();
        let mut state = self.lock();
        state.check_failure(StoreOp::PatchStatus, &kind, name)?;
        let key = key::<K>(namespace, name);
        let version = state.next_version();
        let Some(value) = state.objects.get_mut(&key) else {
            return Err(StoreError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };

        if let Some(status_patch) = patch.get("status") {
            if let Some(object) = value.as_object_mut() {
                let status = object.entry("status").or_insert(Value::Null);
                merge_patch(status, status_patch);
            }
        }
        if let Some(meta) = metadata(value) {
            meta.insert("resourceVersion".to_string(), Value::String(version));
        }
        state.record(StoreOp::PatchStatus, &kind, namespace, name);
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.delay().await;
        Ok(self.lock().namespaces.contains(name))
    }
}

fn key<K: StoredResource>(namespace: &str, name: &str) -> ObjectKey {
    (
        K::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn metadata(value: &mut Value) -> Option<&mut Map<String, Value>> {
    value
        .as_object_mut()?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

fn resource_version(value: &Value) -> Option<&str> {
    value.pointer("/metadata/resourceVersion")?.as_str()
}

fn generation(value: &Value) -> i64 {
    value
        .pointer("/metadata/generation")
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn has_finalizers(value: &Value) -> bool {
    value
        .pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .is_some_and(|f| !f.is_empty())
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (field, value) in patch_map {
            if value.is_null() {
                target_map.remove(field);
            } else {
                merge_patch(
                    target_map.entry(field.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
    }
}
