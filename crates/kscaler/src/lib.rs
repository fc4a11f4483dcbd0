//! Checkpointed scaling for namespace workloads
//!
//! Scales every Deployment and StatefulSet in a namespace down to zero, or
//! back up to the replica count recorded before the last scale-down.
//!
//! The recorded count lives on the workload itself, as the
//! [`DESIRED_REPLICAS_ANNOTATION`] annotation, so no state is kept outside
//! the cluster between runs.
//!
//! # Modules
//!
//! - [`checkpoint`] - Annotation codec and the checkpoint store
//! - [`client`] - Per-kind workload client facade (list, annotate, scale)
//! - [`scaler`] - Generic workload scaler and run summaries
//! - [`factory`] - Binds scalers to the Deployment and StatefulSet clients
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod checkpoint;
pub mod client;
pub mod error;
pub mod factory;
pub mod scaler;

pub use checkpoint::{CheckpointStore, DESIRED_REPLICAS_ANNOTATION};
pub use client::{KubeWorkloadClient, WorkloadClient, WorkloadKind, WorkloadRef};
pub use error::Error;
pub use factory::ScalerFactory;
pub use scaler::{
    KindSummary, RunSummary, ScaleDirection, ScaleStage, StoppedRun, WorkloadOutcome,
    WorkloadReport, WorkloadScaler,
};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on every patch this crate issues
pub const FIELD_MANAGER: &str = "kscaler";
