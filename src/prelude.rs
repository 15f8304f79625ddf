//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use certificate_set_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Reconciler types
pub use crate::controller::builders::{ApplyPolicy, BuildError, CredentialBundle};
pub use crate::controller::reconciler::{
    reconcile, ReconcileError, ReconcileSettings, Reconciler, StatusDelta, TriggerSource,
};

// Storage seam
pub use crate::store::{KubeStore, MemoryStore, ResourceStore, StoreError, StoredResource};

// Config types
pub use crate::config::{ConfigError, ControllerConfig, WatchScope};
