//! # Status
//!
//! Ready / Progressing / Degraded conditions of a CertificateSet.
//!
//! A [`StatusDelta`] snapshots the conditions when an attempt starts, collects
//! the changes the attempt makes, and commits them as one merge patch against
//! the status subresource. Nothing is written when nothing changed, so a
//! converged CertificateSet can be re-reconciled without status churn.
//!
//! A merge patch replaces the whole `conditions` array, so the commit re-reads the
//! live conditions and only swaps in Ready / Progressing / Degraded. Conditions of
//! other types written after the snapshot survive.

use crate::crd::{CertificateSet, Condition};
use crate::store::{ResourceStore, StoreError};
use kube::ResourceExt;
use serde_json::json;
use tracing::debug;

pub const READY: &str = "Ready";
pub const PROGRESSING: &str = "Progressing";
pub const DEGRADED: &str = "Degraded";

/// Condition reasons
pub mod reasons {
    pub const ALL_RESOURCES_READY: &str = "AllResourcesReady";
    pub const COMPLETE: &str = "Complete";
    pub const HEALTHY: &str = "Healthy";
    pub const WAITING_FOR_RESOURCES: &str = "WaitingForResources";
    pub const RESOURCES_PENDING: &str = "ResourcesPending";

    pub const INVALID_RESOURCE: &str = "InvalidResource";
    pub const FINALIZER_FAILED: &str = "FinalizerFailed";
    pub const CLEANUP_FAILED: &str = "CleanupFailed";
    pub const CA_CERTIFICATES_FAILED: &str = "CACertificatesFailed";
    pub const CLIENT_CERTIFICATES_FAILED: &str = "ClientCertificatesFailed";
    pub const DERIVED_SECRETS_FAILED: &str = "DerivedSecretsFailed";
    pub const ARGOCD_NAMESPACE_NOT_FOUND: &str = "ArgoCDNamespaceNotFound";
    pub const ARGOCD_SECRET_CONFLICT: &str = "ArgoCDSecretConflict";
    pub const ARGOCD_CLEANUP_FAILED: &str = "ArgoCDCleanupFailed";
    pub const CHECK_FAILED: &str = "CheckFailed";
    pub const STATUS_UPDATE_FAILED: &str = "StatusUpdateFailed";
    pub const RECONCILE_TIMEOUT: &str = "ReconcileTimeout";
}

const HEALTHY_MESSAGE: &str = "No errors";

/// Condition types this controller owns
const MANAGED_TYPES: [&str; 3] = [READY, PROGRESSING, DEGRADED];

/// Pending condition changes of one attempt
#[derive(Debug, Clone)]
pub struct StatusDelta {
    generation: Option<i64>,
    original: Vec<Condition>,
    conditions: Vec<Condition>,
}

impl StatusDelta {
    #[must_use]
    pub fn new(cs: &CertificateSet) -> Self {
        let original = cs
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default();
        Self {
            generation: cs.metadata.generation,
            conditions: original.clone(),
            original,
        }
    }

    /// Set a condition; returns false when it already had these values.
    ///
    /// `lastTransitionTime` only moves when the status flips.
    pub fn set_condition(
        &mut self,
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
    ) -> bool {
        let status = if status { "True" } else { "False" };
        let existing = self
            .conditions
            .iter()
            .position(|c| c.r#type == condition_type);

        if let Some(index) = existing {
            let current = &self.conditions[index];
            if current.status == status
                && current.reason == reason
                && current.message == message
                && current.observed_generation == self.generation
            {
                return false;
            }
        }

        let last_transition_time = match existing.map(|index| &self.conditions[index]) {
            Some(current) if current.status == status => current.last_transition_time.clone(),
            _ => Some(chrono::Utc::now().to_rfc3339()),
        };
        let condition = Condition {
            r#type: condition_type.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: self.generation,
            last_transition_time,
        };
        match existing {
            Some(index) => self.conditions[index] = condition,
            None => self.conditions.push(condition),
        }
        true
    }

    /// Every required resource is ready
    pub fn mark_converged(&mut self) {
        self.set_condition(READY, true, reasons::ALL_RESOURCES_READY, "All resources are ready");
        self.set_condition(
            PROGRESSING,
            false,
            reasons::COMPLETE,
            "All resources have been reconciled",
        );
        self.set_condition(DEGRADED, false, reasons::HEALTHY, HEALTHY_MESSAGE);
    }

    /// The issuance backend has not finished; `message` names the awaited resource
    pub fn mark_waiting(&mut self, message: &str) {
        self.set_condition(READY, false, reasons::WAITING_FOR_RESOURCES, message);
        self.set_condition(PROGRESSING, true, reasons::RESOURCES_PENDING, message);
        self.set_condition(DEGRADED, false, reasons::HEALTHY, HEALTHY_MESSAGE);
    }

    /// A phase failed with `reason`
    pub fn mark_failed(&mut self, reason: &str, message: &str) {
        self.set_condition(READY, false, reason, message);
        self.set_condition(PROGRESSING, false, reason, message);
        self.set_condition(DEGRADED, true, reason, message);
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.conditions != self.original
    }

    /// `live` with this attempt's managed conditions swapped in
    #[must_use]
    pub fn merged_onto(&self, live: &[Condition]) -> Vec<Condition> {
        let mut merged = live.to_vec();
        for condition in self
            .conditions
            .iter()
            .filter(|c| MANAGED_TYPES.contains(&c.r#type.as_str()))
        {
            match merged.iter_mut().find(|c| c.r#type == condition.r#type) {
                Some(slot) => slot.clone_from(condition),
                None => merged.push(condition.clone()),
            }
        }
        merged
    }

    /// Merge patch for the status subresource over `live`, if anything changed
    #[must_use]
    pub fn patch(&self, live: &[Condition]) -> Option<serde_json::Value> {
        self.is_changed()
            .then(|| json!({ "status": { "conditions": self.merged_onto(live) } }))
    }

    /// Write the changes; returns whether a write happened
    ///
    /// # Errors
    ///
    /// Returns the store error if the status patch fails.
    pub async fn commit<S: ResourceStore>(
        &self,
        store: &S,
        cs: &CertificateSet,
    ) -> Result<bool, StoreError> {
        if !self.is_changed() {
            debug!("status unchanged, skipping update");
            return Ok(false);
        }
        let namespace = cs.namespace().unwrap_or_default();
        let name = cs.name_any();
        let live: Option<CertificateSet> = store.get(&namespace, &name).await?;
        let live_conditions = live
            .and_then(|c| c.status)
            .map(|s| s.conditions)
            .unwrap_or_default();
        let Some(patch) = self.patch(&live_conditions) else {
            return Ok(false);
        };
        store
            .patch_status::<CertificateSet>(&namespace, &name, &patch)
            .await?;
        Ok(true)
    }
}
