//! # Watch Scope
//!
//! Which CertificateSets this controller instance reconciles: every namespace,
//! or a single namespace and/or a label selector. Exactly one mode must be configured.

use super::controller::env_var_or_default_bool;
use kube::api::Api;
use kube::Client;
use kube_runtime::watcher;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("WATCH_ALL_NAMESPACES cannot be combined with WATCH_NAMESPACE or WATCH_LABEL_SELECTOR")]
    ConflictingScope,
    #[error("no watch scope configured: set WATCH_ALL_NAMESPACES=true, WATCH_NAMESPACE or WATCH_LABEL_SELECTOR")]
    MissingScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchScope {
    AllNamespaces,
    Filtered {
        namespace: Option<String>,
        label_selector: Option<String>,
    },
}

impl WatchScope {
    /// Build a scope from its raw settings; empty strings count as unset
    ///
    /// # Errors
    ///
    /// Fails unless exactly one mode is configured.
    pub fn from_parts(
        all_namespaces: bool,
        namespace: Option<String>,
        label_selector: Option<String>,
    ) -> Result<Self, ConfigError> {
        let namespace = namespace.filter(|s| !s.trim().is_empty());
        let label_selector = label_selector.filter(|s| !s.trim().is_empty());

        match (all_namespaces, namespace.is_some() || label_selector.is_some()) {
            (true, true) => Err(ConfigError::ConflictingScope),
            (true, false) => Ok(WatchScope::AllNamespaces),
            (false, true) => Ok(WatchScope::Filtered {
                namespace,
                label_selector,
            }),
            (false, false) => Err(ConfigError::MissingScope),
        }
    }

    /// Read `WATCH_ALL_NAMESPACES`, `WATCH_NAMESPACE` and `WATCH_LABEL_SELECTOR`
    ///
    /// # Errors
    ///
    /// See [`WatchScope::from_parts`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_parts(
            env_var_or_default_bool("WATCH_ALL_NAMESPACES", false),
            std::env::var("WATCH_NAMESPACE").ok(),
            std::env::var("WATCH_LABEL_SELECTOR").ok(),
        )
    }

    /// Api handle covering this scope
    #[must_use]
    pub fn api<K>(&self, client: Client) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        match self {
            WatchScope::Filtered {
                namespace: Some(namespace),
                ..
            } => Api::namespaced(client, namespace),
            _ => Api::all(client),
        }
    }

    /// Watcher configuration carrying the label selector, if any
    #[must_use]
    pub fn watcher_config(&self) -> watcher::Config {
        match self {
            WatchScope::Filtered {
                label_selector: Some(selector),
                ..
            } => watcher::Config::default().labels(selector),
            _ => watcher::Config::default(),
        }
    }
}

impl std::fmt::Display for WatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchScope::AllNamespaces => write!(f, "all namespaces"),
            WatchScope::Filtered {
                namespace,
                label_selector,
            } => write!(
                f,
                "namespace={} selector={}",
                namespace.as_deref().unwrap_or("*"),
                label_selector.as_deref().unwrap_or("<none>")
            ),
        }
    }
}
