//! Workload client facade
//!
//! Deployments and StatefulSets expose the same operations the scaler needs
//! (list, read annotations, merge-patch annotations, read and replace the
//! scale subresource) through distinct typed APIs. [`WorkloadClient`] is the
//! small capability surface over either kind, so the checkpoint protocol is
//! written once and tested against mocks.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v1::Scale;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result, FIELD_MANAGER};

/// Replica count the API server defaults `spec.replicas` to when unset
const DEFAULT_SPEC_REPLICAS: i32 = 1;

/// Kinds of workload the scaler knows how to checkpoint and scale
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum WorkloadKind {
    /// apps/v1 Deployment
    Deployment,
    /// apps/v1 StatefulSet
    StatefulSet,
}

impl WorkloadKind {
    /// Every supported kind, in the order a run processes them
    pub const ALL: [WorkloadKind; 2] = [WorkloadKind::Deployment, WorkloadKind::StatefulSet];

    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of one scalable workload
///
/// Fetched fresh by every listing and dropped once the workload has been
/// processed. Nothing here is cached between calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadRef {
    /// Workload kind
    pub kind: WorkloadKind,
    /// Namespace the workload lives in
    pub namespace: String,
    /// Workload name
    pub name: String,
    /// `spec.replicas` at listing time
    pub current_replicas: i32,
    /// Annotations at listing time
    pub annotations: BTreeMap<String, String>,
}

impl WorkloadRef {
    /// Create a snapshot with no annotations
    pub fn new(
        kind: WorkloadKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        current_replicas: i32,
    ) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            current_replicas,
            annotations: BTreeMap::new(),
        }
    }

    /// Add an annotation to the snapshot
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// Operations the scaler needs against one workload kind in one namespace
///
/// Implementations are bound to a kind and namespace at construction; every
/// call hits the API server, there is no caching.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Kind this client is bound to
    fn kind(&self) -> WorkloadKind;

    /// List every workload of this kind in the namespace
    async fn list(&self) -> Result<Vec<WorkloadRef>>;

    /// Read the current annotations of a workload
    async fn get_annotations(&self, name: &str) -> Result<BTreeMap<String, String>>;

    /// Apply a JSON merge patch to a workload
    ///
    /// Must merge, never replace, so unrelated annotations survive.
    async fn patch_annotations(&self, name: &str, patch: &serde_json::Value) -> Result<()>;

    /// Read the scale subresource of a workload
    async fn get_scale(&self, name: &str) -> Result<Scale>;

    /// Replace the scale subresource of a workload
    ///
    /// The resourceVersion carried by `scale` is honored, so a scale read
    /// and then modified elsewhere is rejected with a conflict.
    async fn update_scale(&self, name: &str, scale: &Scale) -> Result<Scale>;
}

/// A namespaced workload type exposing the scale subresource
pub trait ScalableWorkload:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    /// Kind reported for workloads of this type
    const WORKLOAD_KIND: WorkloadKind;

    /// `spec.replicas`, if the spec is present and sets it
    fn spec_replicas(&self) -> Option<i32>;
}

impl ScalableWorkload for Deployment {
    const WORKLOAD_KIND: WorkloadKind = WorkloadKind::Deployment;

    fn spec_replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|s| s.replicas)
    }
}

impl ScalableWorkload for StatefulSet {
    const WORKLOAD_KIND: WorkloadKind = WorkloadKind::StatefulSet;

    fn spec_replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|s| s.replicas)
    }
}

/// Real Kubernetes client implementation for one workload type
pub struct KubeWorkloadClient<K: ScalableWorkload> {
    api: Api<K>,
    namespace: String,
}

impl<K: ScalableWorkload> KubeWorkloadClient<K> {
    /// Bind a client to the given namespace
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    fn to_ref(&self, workload: &K) -> WorkloadRef {
        WorkloadRef {
            kind: K::WORKLOAD_KIND,
            namespace: self.namespace.clone(),
            name: workload.name_any(),
            current_replicas: workload.spec_replicas().unwrap_or(DEFAULT_SPEC_REPLICAS),
            annotations: workload.annotations().clone(),
        }
    }
}

#[async_trait]
impl<K: ScalableWorkload> WorkloadClient for KubeWorkloadClient<K> {
    fn kind(&self) -> WorkloadKind {
        K::WORKLOAD_KIND
    }

    async fn list(&self) -> Result<Vec<WorkloadRef>> {
        let list = self.api.list(&ListParams::default()).await?;
        debug!(
            kind = %K::WORKLOAD_KIND,
            namespace = %self.namespace,
            count = list.items.len(),
            "listed workloads"
        );
        Ok(list.items.iter().map(|w| self.to_ref(w)).collect())
    }

    async fn get_annotations(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let workload = self.api.get(name).await?;
        Ok(workload.annotations().clone())
    }

    async fn patch_annotations(&self, name: &str, patch: &serde_json::Value) -> Result<()> {
        self.api
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn get_scale(&self, name: &str) -> Result<Scale> {
        Ok(self.api.get_scale(name).await?)
    }

    async fn update_scale(&self, name: &str, scale: &Scale) -> Result<Scale> {
        let body = serde_json::to_vec(scale)
            .map_err(|e| Error::serialization_for_kind("Scale", e.to_string()))?;
        Ok(self
            .api
            .replace_scale(name, &PostParams::default(), body)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, StatefulSetSpec};

    #[test]
    fn test_kind_display_matches_api_kind() {
        assert_eq!(WorkloadKind::Deployment.to_string(), "Deployment");
        assert_eq!(WorkloadKind::StatefulSet.to_string(), "StatefulSet");
        assert_eq!(WorkloadKind::Deployment.as_str(), Deployment::WORKLOAD_KIND.as_str());
    }

    #[test]
    fn test_all_kinds_start_with_deployments() {
        assert_eq!(
            WorkloadKind::ALL,
            [WorkloadKind::Deployment, WorkloadKind::StatefulSet]
        );
    }

    #[test]
    fn test_spec_replicas_reads_spec() {
        let deployment = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(deployment.spec_replicas(), Some(4));

        let sts = StatefulSet {
            spec: Some(StatefulSetSpec {
                replicas: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(sts.spec_replicas(), Some(2));
    }

    #[test]
    fn test_spec_replicas_missing_spec() {
        assert_eq!(Deployment::default().spec_replicas(), None);
        assert_eq!(StatefulSet::default().spec_replicas(), None);
    }

    #[test]
    fn test_workload_ref_builder() {
        let w = WorkloadRef::new(WorkloadKind::StatefulSet, "default", "db", 3)
            .with_annotation("team", "data");
        assert_eq!(w.name, "db");
        assert_eq!(w.current_replicas, 3);
        assert_eq!(w.annotations.get("team").map(String::as_str), Some("data"));
    }

    #[test]
    fn test_kind_serializes_as_api_kind() {
        let json = serde_json::to_string(&WorkloadKind::StatefulSet).unwrap();
        assert_eq!(json, "\"StatefulSet\"");
    }
}
