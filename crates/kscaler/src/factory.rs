//! Scaler factory
//!
//! Binds one [`WorkloadScaler`] per supported kind to a namespace. Every
//! scaler shares the same checkpoint protocol; only the client facade
//! differs between kinds. Building scalers performs no I/O.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{KubeWorkloadClient, WorkloadClient, WorkloadKind};
use crate::scaler::{RunSummary, ScaleDirection, StoppedRun, WorkloadScaler};

/// Produces workload scalers for one namespace
pub struct ScalerFactory {
    namespace: String,
    clients: Vec<Arc<dyn WorkloadClient>>,
}

impl ScalerFactory {
    /// Bind the Deployment and StatefulSet clients to `namespace`
    pub fn new(client: Client, namespace: &str) -> Self {
        let clients = WorkloadKind::ALL
            .iter()
            .map(|kind| kube_client_for(*kind, client.clone(), namespace))
            .collect();
        Self::from_clients(namespace, clients)
    }

    /// Bind arbitrary client facades, processed in the given order
    pub fn from_clients(
        namespace: impl Into<String>,
        clients: Vec<Arc<dyn WorkloadClient>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            clients,
        }
    }

    /// Namespace every scaler is bound to
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Client facade bound to `kind`, if the factory has one
    pub fn client_for(&self, kind: WorkloadKind) -> Option<Arc<dyn WorkloadClient>> {
        self.clients.iter().find(|c| c.kind() == kind).cloned()
    }

    /// Scaler for a single kind
    pub fn scaler_for(
        &self,
        kind: WorkloadKind,
        direction: ScaleDirection,
    ) -> Option<WorkloadScaler> {
        self.client_for(kind)
            .map(|client| WorkloadScaler::new(client, self.namespace.clone(), direction))
    }

    /// One scaler per bound kind, in processing order
    pub fn scalers(&self, direction: ScaleDirection) -> Vec<WorkloadScaler> {
        self.clients
            .iter()
            .map(|client| WorkloadScaler::new(client.clone(), self.namespace.clone(), direction))
            .collect()
    }

    /// Scale every workload of every bound kind
    ///
    /// Kinds are processed one after another. A kind that cannot be listed,
    /// or cancellation before a kind starts, stops the run: the summary
    /// keeps every kind handled so far and records why it stopped in
    /// [`RunSummary::stopped`]. Workloads already scaled stay scaled.
    pub async fn run(&self, direction: ScaleDirection, cancel: &CancellationToken) -> RunSummary {
        info!(namespace = %self.namespace, %direction, "starting scale run");

        let mut summary = RunSummary {
            namespace: self.namespace.clone(),
            direction,
            kinds: Vec::with_capacity(self.clients.len()),
            stopped: None,
        };
        for scaler in self.scalers(direction) {
            match scaler.run(cancel).await {
                Ok(kind) => summary.kinds.push(kind),
                Err(e) => {
                    warn!(
                        namespace = %self.namespace,
                        stopped_at = %scaler.kind(),
                        scaled = summary.scaled(),
                        error = %e,
                        "scale run stopped early"
                    );
                    summary.stopped = Some(StoppedRun::new(scaler.kind(), &e));
                    break;
                }
            }
        }

        info!(
            namespace = %self.namespace,
            scaled = summary.scaled(),
            failed = summary.failures().len(),
            "scale run finished"
        );
        summary
    }
}

fn kube_client_for(
    kind: WorkloadKind,
    client: Client,
    namespace: &str,
) -> Arc<dyn WorkloadClient> {
    match kind {
        WorkloadKind::Deployment => {
            Arc::new(KubeWorkloadClient::<Deployment>::new(client, namespace))
        }
        WorkloadKind::StatefulSet => {
            Arc::new(KubeWorkloadClient::<StatefulSet>::new(client, namespace))
        }
    }
}
