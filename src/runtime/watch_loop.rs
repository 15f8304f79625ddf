//! # Watch Loop
//!
//! Controller watch loop that monitors CertificateSet resources, and the
//! children they own, and triggers reconciliation when changes are detected.

use crate::config::WatchScope;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::{Certificate, CertificateSet, Issuer};
use crate::runtime::error_policy::error_policy;
use crate::store::KubeStore;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::Client;
use kube_runtime::{controller, watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Child kinds whose changes re-trigger reconciliation of their owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnedKind {
    Secret,
    Certificate,
    Issuer,
}

pub const OWNED_KINDS: [OwnedKind; 3] = [OwnedKind::Secret, OwnedKind::Certificate, OwnedKind::Issuer];

impl OwnedKind {
    fn subscribe(
        self,
        controller: Controller<CertificateSet>,
        scope: &WatchScope,
        client: &Client,
    ) -> Controller<CertificateSet> {
        let config = watcher::Config::default();
        match self {
            OwnedKind::Secret => controller.owns(scope.api::<Secret>(client.clone()), config),
            OwnedKind::Certificate => {
                controller.owns(scope.api::<Certificate>(client.clone()), config)
            }
            OwnedKind::Issuer => controller.owns(scope.api::<Issuer>(client.clone()), config),
        }
    }
}

/// Run the controller until a shutdown signal arrives
///
/// # Errors
///
/// Stream errors are logged, not returned; the loop ends on SIGTERM / Ctrl-C.
pub async fn run_watch_loop(
    client: Client,
    scope: WatchScope,
    reconciler: Arc<Reconciler<KubeStore>>,
    server_state: Arc<ServerState>,
    max_concurrent_reconciliations: usize,
) -> Result<(), anyhow::Error> {
    info!("Starting controller watch loop ({})...", scope);

    let concurrency = u16::try_from(max_concurrent_reconciliations).unwrap_or(u16::MAX);
    let mut controller = Controller::new(
        scope.api::<CertificateSet>(client.clone()),
        scope.watcher_config().any_semantic(),
    );
    for kind in OWNED_KINDS {
        controller = kind.subscribe(controller, &scope, &client);
    }

    controller
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile::<KubeStore>, error_policy::<KubeStore>, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object, _action)) => debug!(resource = %object, "watch.event.success"),
                Err(e) => warn!("Controller stream error: {}", e),
            }
        })
        .instrument(tracing::info_span!("controller.watch", operation = "watch_loop"))
        .await;

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}
