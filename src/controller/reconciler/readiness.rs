//! # Readiness
//!
//! Whether the issuance backend has finished satisfying a resource.
//! A missing resource is "not ready", never an error; only failed lookups are errors.

use crate::controller::builders::secrets::{CA_CERT_KEY, TLS_CERT_KEY, TLS_KEY_KEY};
use crate::controller::builders::CredentialBundle;
use crate::crd::{Certificate, Issuer};
use crate::store::{ResourceStore, StoreError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::api::core::v1::Secret;

const ISSUED_KEYS: [&str; 3] = [CA_CERT_KEY, TLS_CERT_KEY, TLS_KEY_KEY];

fn has_issued_keys(secret: &Secret) -> bool {
    secret
        .data
        .as_ref()
        .is_some_and(|data| ISSUED_KEYS.iter().all(|key| data.contains_key(*key)))
}

/// True once the secret carries `ca.crt`, `tls.crt` and `tls.key`
pub async fn secret_ready<S: ResourceStore>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<bool, StoreError> {
    let secret: Option<Secret> = store.get(namespace, name).await?;
    Ok(secret.as_ref().is_some_and(has_issued_keys))
}

/// True once cert-manager reports `Ready=True` on the certificate
pub async fn certificate_ready<S: ResourceStore>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<bool, StoreError> {
    let certificate: Option<Certificate> = store.get(namespace, name).await?;
    Ok(certificate
        .and_then(|c| c.status)
        .is_some_and(|status| status.is_ready()))
}

/// True once cert-manager reports `Ready=True` on the issuer
pub async fn issuer_ready<S: ResourceStore>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<bool, StoreError> {
    let issuer: Option<Issuer> = store.get(namespace, name).await?;
    Ok(issuer
        .and_then(|i| i.status)
        .is_some_and(|status| status.is_ready()))
}

/// Read an issued key pair, base64-encoding each field for embedding
///
/// # Errors
///
/// Fails if the secret is missing, lacks one of the issued keys, or the lookup fails.
pub async fn credential_bundle<S: ResourceStore>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<CredentialBundle, StoreError> {
    let secret: Secret = store
        .get(namespace, name)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            kind: "Secret".to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;
    let data = secret.data.unwrap_or_default();
    let field = |key: &'static str| {
        data.get(key)
            .map(|value| STANDARD.encode(&value.0))
            .ok_or_else(|| StoreError::MissingField {
                kind: "Secret".to_string(),
                field: key,
            })
    };

    Ok(CredentialBundle {
        ca_cert: field(CA_CERT_KEY)?,
        tls_cert: field(TLS_CERT_KEY)?,
        tls_key: field(TLS_KEY_KEY)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{CertificateSpec, IssuerObjectReference};
    use crate::store::MemoryStore;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ns".to_string()),
            ..Default::default()
        }
    }

    fn secret(name: &str, keys: &[&str]) -> Secret {
        Secret {
            metadata: meta(name),
            data: Some(
                keys.iter()
                    .map(|key| ((*key).to_string(), ByteString(key.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    fn certificate(name: &str) -> Certificate {
        Certificate {
            metadata: meta(name),
            spec: CertificateSpec {
                common_name: None,
                duration: None,
                renew_before: None,
                is_ca: false,
                issuer_ref: IssuerObjectReference {
                    name: "root".to_string(),
                    kind: String::new(),
                    group: String::new(),
                },
                private_key: None,
                secret_name: name.to_string(),
                secret_template: None,
                subject: None,
                usages: Vec::new(),
            },
            status: None,
        }
    }

    #[tokio::test]
    async fn secret_needs_all_three_keys() {
        let store = MemoryStore::new();
        store.insert(&secret("partial", &["ca.crt", "tls.crt"])).unwrap();
        store
            .insert(&secret("issued", &["ca.crt", "tls.crt", "tls.key"]))
            .unwrap();

        assert!(!secret_ready(&store, "ns", "missing").await.unwrap());
        assert!(!secret_ready(&store, "ns", "partial").await.unwrap());
        assert!(secret_ready(&store, "ns", "issued").await.unwrap());
    }

    #[tokio::test]
    async fn certificate_needs_ready_condition() {
        let store = MemoryStore::new();
        store.insert(&certificate("cert")).unwrap();
        assert!(!certificate_ready(&store, "ns", "cert").await.unwrap());
        assert!(!certificate_ready(&store, "ns", "missing").await.unwrap());

        store.set_status::<Certificate>(
            "ns",
            "cert",
            json!({"conditions": [{"type": "Ready", "status": "True"}]}),
        );
        assert!(certificate_ready(&store, "ns", "cert").await.unwrap());
    }

    #[tokio::test]
    async fn lookup_failures_are_errors() {
        let store = MemoryStore::new();
        store.fail(crate::store::StoreOp::Get, "Issuer", "unavailable");
        let err = issuer_ready(&store, "ns", "tenant-ca").await.unwrap_err();
        assert!(matches!(err, StoreError::Api { code: 500, .. }));
    }

    #[tokio::test]
    async fn bundle_is_base64_encoded() {
        let store = MemoryStore::new();
        store
            .insert(&secret("issued", &["ca.crt", "tls.crt", "tls.key"]))
            .unwrap();

        let bundle = credential_bundle(&store, "ns", "issued").await.unwrap();
        assert_eq!(bundle.ca_cert, STANDARD.encode("ca.crt"));
        assert_eq!(bundle.tls_key, STANDARD.encode("tls.key"));

        store.insert(&secret("partial", &["ca.crt"])).unwrap();
        let err = credential_bundle(&store, "ns", "partial").await.unwrap_err();
        assert!(matches!(err, StoreError::MissingField { field: "tls.crt", .. }));
    }
}
