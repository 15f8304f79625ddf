//! # CertificateSet Controller
//!
//! A Kubernetes controller that turns `CertificateSet` resources into the
//! cert-manager certificates, issuer and derived secrets a cluster needs.
//!
//! ## Overview
//!
//! For each CertificateSet the controller:
//!
//! 1. **Creates CA certificates** - `<name>-ca`, plus etcd / proxy / OIDC certificates for `system` and `infra`
//! 2. **Waits for issuance** - cert-manager fills in each secret; the controller requeues until it has
//! 3. **Creates client credentials** - a CA issuer and a `system:masters` super-admin certificate
//! 4. **Derives secrets** - a kubeconfig secret and an ArgoCD cluster registration secret
//! 5. **Reports status** - `Ready`, `Progressing` and `Degraded` conditions
//!
//! See the [README.md](../README.md) for deployment instructions.

use anyhow::Result;
use certificate_set_controller::observability;
use certificate_set_controller::runtime::{initialize, run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    let result = run_watch_loop(
        init.client,
        init.scope,
        init.reconciler,
        init.server_state,
        init.config.max_concurrent_reconciliations,
    )
    .await;

    observability::shutdown_otel(init.otel_tracer_provider);
    result
}
