//! # Certificate and Issuer Builders
//!
//! cert-manager resources requested for a CertificateSet.

use super::{child_metadata, names};
use crate::constants::{
    CA_CERTIFICATE_DURATION, CERTIFICATE_RENEW_BEFORE, CERT_MANAGER_GROUP,
    CLIENT_CERTIFICATE_DURATION, PRIVATE_KEY_SIZE, SUPER_ADMIN_ORGANIZATION,
};
use crate::crd::{
    CaIssuer, Certificate, CertificatePrivateKey, CertificateSecretTemplate, CertificateSet,
    CertificateSpec, Environment, Issuer, IssuerObjectReference, IssuerReference, IssuerSpec,
    KeyUsage, PrivateKeyAlgorithm, RotationPolicy, X509Subject,
};

const CA_USAGES: [KeyUsage; 3] = [
    KeyUsage::CertSign,
    KeyUsage::KeyEncipherment,
    KeyUsage::DigitalSignature,
];

const CLIENT_USAGES: [KeyUsage; 3] = [
    KeyUsage::ClientAuth,
    KeyUsage::DataEncipherment,
    KeyUsage::KeyEncipherment,
];

fn rsa_private_key(rotation_policy: RotationPolicy) -> CertificatePrivateKey {
    CertificatePrivateKey {
        algorithm: Some(PrivateKeyAlgorithm::Rsa),
        rotation_policy: Some(rotation_policy),
        size: Some(PRIVATE_KEY_SIZE),
    }
}

fn secret_template(cs: &CertificateSet) -> CertificateSecretTemplate {
    CertificateSecretTemplate {
        labels: cs.metadata.labels.clone().unwrap_or_default(),
        annotations: Default::default(),
    }
}

fn issuer_ref(reference: &IssuerReference) -> IssuerObjectReference {
    IssuerObjectReference {
        name: reference.name.clone(),
        kind: reference.kind.clone(),
        group: reference.group().to_string(),
    }
}

/// Long-lived certificate whose secret name matches its own name
fn long_lived(cs: &CertificateSet, name: String) -> Certificate {
    Certificate {
        metadata: child_metadata(cs, &name),
        spec: CertificateSpec {
            common_name: Some(name.clone()),
            duration: Some(CA_CERTIFICATE_DURATION.to_string()),
            renew_before: Some(CERTIFICATE_RENEW_BEFORE.to_string()),
            is_ca: false,
            issuer_ref: issuer_ref(&cs.spec.issuer_ref),
            private_key: Some(rsa_private_key(RotationPolicy::Never)),
            secret_name: name,
            secret_template: Some(secret_template(cs)),
            subject: None,
            usages: Vec::new(),
        },
        status: None,
    }
}

fn ca_certificate_named(cs: &CertificateSet, name: String) -> Certificate {
    let mut cert = long_lived(cs, name);
    cert.spec.is_ca = true;
    cert.spec.usages = CA_USAGES.to_vec();
    cert
}

#[must_use]
pub fn build_ca_certificate(cs: &CertificateSet) -> Certificate {
    ca_certificate_named(cs, names::ca_name(cs))
}

#[must_use]
pub fn build_etcd_certificate(cs: &CertificateSet) -> Certificate {
    ca_certificate_named(cs, names::etcd_name(cs))
}

#[must_use]
pub fn build_proxy_certificate(cs: &CertificateSet) -> Certificate {
    ca_certificate_named(cs, names::proxy_name(cs))
}

/// OIDC certificate
///
/// A CA signed by `issuerRef` in `system`. In `infra` it is a leaf signed by
/// `issuerRefOidc`, falling back to `issuerRef` when no OIDC issuer is given.
#[must_use]
pub fn build_oidc_certificate(cs: &CertificateSet) -> Certificate {
    let name = names::ca_oidc_name(cs);
    match cs.spec.environment {
        Environment::Infra => {
            let mut cert = long_lived(cs, name);
            if let Some(oidc) = &cs.spec.issuer_ref_oidc {
                cert.spec.issuer_ref = issuer_ref(oidc);
            }
            cert
        }
        Environment::System | Environment::Client => ca_certificate_named(cs, name),
    }
}

/// Certificates of the CA phase: the CA, plus etcd / front-proxy / OIDC for system and infra
#[must_use]
pub fn ca_phase_certificates(cs: &CertificateSet) -> Vec<Certificate> {
    let mut certs = vec![build_ca_certificate(cs)];
    if cs.spec.environment.needs_system_certificates() {
        certs.push(build_etcd_certificate(cs));
        certs.push(build_proxy_certificate(cs));
        certs.push(build_oidc_certificate(cs));
    }
    certs
}

/// CA issuer signing with the `<name>-ca` key pair
#[must_use]
pub fn build_issuer(cs: &CertificateSet) -> Issuer {
    let name = names::ca_name(cs);
    Issuer {
        metadata: child_metadata(cs, &name),
        spec: IssuerSpec {
            ca: Some(CaIssuer { secret_name: name }),
        },
        status: None,
    }
}

#[must_use]
pub fn build_super_admin_certificate(cs: &CertificateSet, issuer_name: &str) -> Certificate {
    let name = names::super_admin_name(cs);
    Certificate {
        metadata: child_metadata(cs, &name),
        spec: CertificateSpec {
            common_name: Some(name.clone()),
            duration: Some(CLIENT_CERTIFICATE_DURATION.to_string()),
            renew_before: Some(CERTIFICATE_RENEW_BEFORE.to_string()),
            is_ca: false,
            issuer_ref: IssuerObjectReference {
                name: issuer_name.to_string(),
                kind: "Issuer".to_string(),
                group: CERT_MANAGER_GROUP.to_string(),
            },
            private_key: Some(rsa_private_key(RotationPolicy::Always)),
            secret_name: name,
            secret_template: Some(secret_template(cs)),
            subject: Some(X509Subject {
                organizations: vec![SUPER_ADMIN_ORGANIZATION.to_string()],
            }),
            usages: CLIENT_USAGES.to_vec(),
        },
        status: None,
    }
}
