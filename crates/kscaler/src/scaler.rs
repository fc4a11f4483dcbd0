//! Workload scaler
//!
//! A [`WorkloadScaler`] drives one workload kind in one namespace through a
//! single pass:
//!
//! 1. List every workload of the kind. A listing failure ends the pass.
//! 2. For each workload, independently:
//!    - resolve the target replica count through the [`CheckpointStore`]
//!      (recording the current count first when scaling down),
//!    - read the scale subresource,
//!    - write the target count back through the scale subresource.
//!
//! Workloads never share state, so they are processed concurrently. Within
//! one workload the steps run strictly in order: a workload is only zeroed
//! after its checkpoint write has succeeded. A failing workload is reported
//! in the [`KindSummary`] and does not stop its siblings; nothing already
//! applied to other workloads is rolled back.
//!
//! Cancellation is only observed between steps. A step that has started
//! (in particular a checkpoint write) always runs to completion.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use k8s_openapi::api::autoscaling::v1::Scale;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::checkpoint::CheckpointStore;
use crate::client::{WorkloadClient, WorkloadKind, WorkloadRef};
use crate::{Error, Result};

/// Which way a run moves every workload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleDirection {
    /// Restore each workload to its recorded replica count
    Up,
    /// Record each workload's replica count, then scale it to zero
    Down,
}

impl ScaleDirection {
    /// Lowercase name, as accepted on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleDirection::Up => "up",
            ScaleDirection::Down => "down",
        }
    }
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step of the per-workload sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleStage {
    /// Writing the checkpoint annotation (scale down)
    RecordCheckpoint,
    /// Reading the checkpoint annotation (scale up)
    ReadCheckpoint,
    /// Reading the scale subresource
    ReadScale,
    /// Writing the scale subresource
    ApplyScale,
}

impl ScaleStage {
    /// Kebab-case step name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleStage::RecordCheckpoint => "record-checkpoint",
            ScaleStage::ReadCheckpoint => "read-checkpoint",
            ScaleStage::ReadScale => "read-scale",
            ScaleStage::ApplyScale => "apply-scale",
        }
    }
}

impl fmt::Display for ScaleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a single workload during a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum WorkloadOutcome {
    /// The scale subresource was updated
    Scaled {
        /// Replica count before the update
        from: i32,
        /// Replica count written
        to: i32,
    },
    /// A step failed before anything was written to the workload
    Failed {
        /// Step that failed
        stage: ScaleStage,
        /// Error reported by the step
        error: String,
    },
    /// The checkpoint was recorded but the workload was not scaled down
    ///
    /// The workload still runs at its old count and carries a fresh
    /// checkpoint; rerunning the scale-down is safe.
    NeedsAttention {
        /// Replica count recorded in the checkpoint
        checkpoint: i32,
        /// Step that failed after the checkpoint was written
        stage: ScaleStage,
        /// Error reported by the step
        error: String,
    },
    /// Cancellation arrived before the step could start
    ///
    /// On the way down this is only reported before the checkpoint is
    /// written; later cancellations are [`WorkloadOutcome::NeedsAttention`].
    Cancelled {
        /// Step that was skipped
        stage: ScaleStage,
    },
}

impl WorkloadOutcome {
    /// Whether the workload reached its target replica count
    pub fn is_success(&self) -> bool {
        matches!(self, WorkloadOutcome::Scaled { .. })
    }

    /// Short status label
    pub fn status(&self) -> &'static str {
        match self {
            WorkloadOutcome::Scaled { .. } => "scaled",
            WorkloadOutcome::Failed { .. } => "failed",
            WorkloadOutcome::NeedsAttention { .. } => "needs-attention",
            WorkloadOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

/// Outcome for one named workload
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkloadReport {
    /// Workload kind
    pub kind: WorkloadKind,
    /// Workload name
    pub name: String,
    /// What happened
    #[serde(flatten)]
    pub outcome: WorkloadOutcome,
}

/// Every workload report for one kind
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    /// Kind the pass covered
    pub kind: WorkloadKind,
    /// Namespace the pass covered
    pub namespace: String,
    /// One report per listed workload, in listing order
    pub reports: Vec<WorkloadReport>,
}

/// Why a run ended before every kind was processed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoppedRun {
    /// First kind that was not processed
    pub kind: WorkloadKind,
    /// Error that stopped the run
    pub error: String,
    /// Whether the run was cancelled rather than failed
    pub cancelled: bool,
    /// Whether a rerun may succeed without intervention
    pub retryable: bool,
}

impl StoppedRun {
    /// Record the error that kept `kind` from being processed
    pub fn new(kind: WorkloadKind, error: &Error) -> Self {
        Self {
            kind,
            error: error.to_string(),
            cancelled: error.is_cancelled(),
            retryable: error.is_retryable(),
        }
    }
}

/// Every kind summary for one run
///
/// Kinds handled before the run stopped keep their reports, so workloads
/// that were already zeroed or checkpointed are never lost from the output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Namespace the run covered
    pub namespace: String,
    /// Direction applied to every workload
    pub direction: ScaleDirection,
    /// Per-kind summaries, in processing order
    pub kinds: Vec<KindSummary>,
    /// Set when a kind could not be processed and the run ended early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<StoppedRun>,
}

impl RunSummary {
    /// Iterate over every workload report of the run
    pub fn reports(&self) -> impl Iterator<Item = &WorkloadReport> {
        self.kinds.iter().flat_map(|k| k.reports.iter())
    }

    /// Number of workloads that reached their target
    pub fn scaled(&self) -> usize {
        self.reports().filter(|r| r.outcome.is_success()).count()
    }

    /// Reports of workloads that did not reach their target
    pub fn failures(&self) -> Vec<&WorkloadReport> {
        self.reports().filter(|r| !r.outcome.is_success()).collect()
    }

    /// Whether any workload did not reach its target, or the run stopped early
    pub fn has_failures(&self) -> bool {
        self.stopped.is_some() || self.reports().any(|r| !r.outcome.is_success())
    }
}

/// Scales every workload of one kind in one namespace
pub struct WorkloadScaler {
    client: Arc<dyn WorkloadClient>,
    namespace: String,
    direction: ScaleDirection,
}

impl WorkloadScaler {
    /// Create a scaler over a client already bound to `namespace`
    pub fn new(
        client: Arc<dyn WorkloadClient>,
        namespace: impl Into<String>,
        direction: ScaleDirection,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            direction,
        }
    }

    /// Kind this scaler drives
    pub fn kind(&self) -> WorkloadKind {
        self.client.kind()
    }

    /// Direction this scaler applies
    pub fn direction(&self) -> ScaleDirection {
        self.direction
    }

    /// Run one pass over every workload of this kind
    ///
    /// Returns an error only when the pass could not start: cancellation
    /// before listing, or a listing failure. Per-workload failures are
    /// reported in the summary.
    #[instrument(
        skip(self, cancel),
        fields(kind = %self.kind(), namespace = %self.namespace, direction = %self.direction)
    )]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<KindSummary> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(format!("listing {}s", self.kind())));
        }

        let workloads = self
            .client
            .list()
            .await
            .map_err(|e| Error::listing(self.kind().as_str(), &self.namespace, &e))?;
        info!(count = workloads.len(), "scaling workloads");

        let reports = join_all(workloads.iter().map(|w| self.scale_workload(w, cancel))).await;

        Ok(KindSummary {
            kind: self.kind(),
            namespace: self.namespace.clone(),
            reports,
        })
    }

    /// Checkpoint (or restore) and scale a single workload
    pub async fn scale_workload(
        &self,
        workload: &WorkloadRef,
        cancel: &CancellationToken,
    ) -> WorkloadReport {
        let outcome = self.scale_steps(workload, cancel).await;
        match &outcome {
            WorkloadOutcome::Scaled { from, to } => {
                info!(
                    kind = %workload.kind,
                    workload = %workload.name,
                    from,
                    to,
                    "scaled workload"
                );
            }
            WorkloadOutcome::Failed { stage, error } => {
                warn!(
                    kind = %workload.kind,
                    workload = %workload.name,
                    %stage,
                    %error,
                    "failed to scale workload"
                );
            }
            WorkloadOutcome::NeedsAttention {
                checkpoint,
                stage,
                error,
            } => {
                warn!(
                    kind = %workload.kind,
                    workload = %workload.name,
                    checkpoint,
                    %stage,
                    %error,
                    "checkpoint recorded but workload not scaled down, needs attention"
                );
            }
            WorkloadOutcome::Cancelled { stage } => {
                warn!(kind = %workload.kind, workload = %workload.name, %stage, "cancelled");
            }
        }
        WorkloadReport {
            kind: workload.kind,
            name: workload.name.clone(),
            outcome,
        }
    }

    async fn scale_steps(
        &self,
        workload: &WorkloadRef,
        cancel: &CancellationToken,
    ) -> WorkloadOutcome {
        let resolve_stage = match self.direction {
            ScaleDirection::Down => ScaleStage::RecordCheckpoint,
            ScaleDirection::Up => ScaleStage::ReadCheckpoint,
        };
        if cancel.is_cancelled() {
            return WorkloadOutcome::Cancelled {
                stage: resolve_stage,
            };
        }

        let store = CheckpointStore::new(self.client.as_ref());
        let target = match store
            .resolve_target_replicas(workload, self.direction)
            .await
        {
            Ok(target) => target,
            Err(e) => {
                return WorkloadOutcome::Failed {
                    stage: resolve_stage,
                    error: e.to_string(),
                }
            }
        };

        if cancel.is_cancelled() {
            return self.cancelled_after_checkpoint(workload, ScaleStage::ReadScale);
        }
        let mut scale = match self.client.get_scale(&workload.name).await {
            Ok(scale) => scale,
            Err(e) => return self.after_checkpoint_failure(workload, ScaleStage::ReadScale, e),
        };
        let from = scale_replicas(&scale);

        if cancel.is_cancelled() {
            return self.cancelled_after_checkpoint(workload, ScaleStage::ApplyScale);
        }
        scale.spec.get_or_insert_with(Default::default).replicas = Some(target);
        if let Err(e) = self.client.update_scale(&workload.name, &scale).await {
            return self.after_checkpoint_failure(workload, ScaleStage::ApplyScale, e);
        }

        WorkloadOutcome::Scaled { from, to: target }
    }

    /// Classify a failure that happened once the target was resolved
    ///
    /// On the way down the checkpoint is already written, which leaves the
    /// workload annotated but still running.
    fn after_checkpoint_failure(
        &self,
        workload: &WorkloadRef,
        stage: ScaleStage,
        error: Error,
    ) -> WorkloadOutcome {
        match self.direction {
            ScaleDirection::Down => WorkloadOutcome::NeedsAttention {
                checkpoint: workload.current_replicas,
                stage,
                error: error.to_string(),
            },
            ScaleDirection::Up => WorkloadOutcome::Failed {
                stage,
                error: error.to_string(),
            },
        }
    }

    /// Classify a cancellation observed once the target was resolved
    ///
    /// A cancelled scale-down still carries the checkpoint it just wrote.
    fn cancelled_after_checkpoint(
        &self,
        workload: &WorkloadRef,
        stage: ScaleStage,
    ) -> WorkloadOutcome {
        match self.direction {
            ScaleDirection::Down => WorkloadOutcome::NeedsAttention {
                checkpoint: workload.current_replicas,
                stage,
                error: Error::cancelled(stage.as_str()).to_string(),
            },
            ScaleDirection::Up => WorkloadOutcome::Cancelled { stage },
        }
    }
}

/// Replica count set on a scale subresource, 0 when unset
fn scale_replicas(scale: &Scale) -> i32 {
    scale
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or_default()
}
