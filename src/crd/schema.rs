//! # CRD Schema
//!
//! Generated `CertificateSet` CRD with CEL validation rules injected into the
//! spec schema. The rules cannot be expressed through derive attributes.

use super::CertificateSet;
use kube::core::CustomResourceExt;
use serde_json::{json, Value};

const SPEC_SCHEMA_POINTER: &str = "/spec/versions/0/schema/openAPIV3Schema/properties/spec";

/// `(property, rule, message)`; an empty property applies to the whole spec
pub const VALIDATION_RULES: [(&str, &str, &str); 4] = [
    ("environment", "self == oldSelf", "environment is immutable"),
    ("kubeconfig", "self == oldSelf", "kubeconfig is immutable"),
    (
        "kubeconfigEndpoint",
        "oldSelf == '' || self == oldSelf",
        "kubeconfigEndpoint cannot be changed once set",
    ),
    (
        "",
        "(!self.kubeconfig && (!has(self.argocdCluster) || !self.argocdCluster)) || (has(self.kubeconfigEndpoint) && self.kubeconfigEndpoint != '')",
        "kubeconfigEndpoint is required when kubeconfig or argocdCluster is enabled",
    ),
];

fn push_rule(schema: &mut Value, rule: &str, message: &str) {
    let Some(object) = schema.as_object_mut() else {
        return;
    };
    let validations = object
        .entry("x-kubernetes-validations")
        .or_insert_with(|| json!([]));
    if let Some(list) = validations.as_array_mut() {
        list.push(json!({ "rule": rule, "message": message }));
    }
}

/// The CertificateSet CRD as JSON, CEL rules included
///
/// # Errors
///
/// Returns an error if the generated CRD cannot be serialized.
pub fn certificate_set_crd() -> Result<Value, serde_json::Error> {
    let mut crd = serde_json::to_value(CertificateSet::crd())?;
    if let Some(spec) = crd.pointer_mut(SPEC_SCHEMA_POINTER) {
        for (property, rule, message) in VALIDATION_RULES {
            if property.is_empty() {
                push_rule(spec, rule, message);
            } else if let Some(schema) = spec.pointer_mut(&format!("/properties/{property}")) {
                push_rule(schema, rule, message);
            }
        }
    }
    Ok(crd)
}
