//! Error types for kscaler
//!
//! Errors carry the workload kind and namespace where that helps an operator
//! tell which part of a run failed. Per-workload failures never surface as
//! an `Error` from a run; they are folded into the run summary instead.

use thiserror::Error;

/// Main error type for scaling operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Listing the workloads of one kind failed
    #[error("failed to list {kind}s in namespace {namespace}: {message}")]
    Listing {
        /// Workload kind being listed
        kind: String,
        /// Namespace being listed
        namespace: String,
        /// Description of what failed
        message: String,
        /// Whether the listing failure looks transient
        retryable: bool,
    },

    /// The run was cancelled before a step could start
    #[error("cancelled before {stage}")]
    Cancelled {
        /// Step that was about to start
        stage: String,
    },
}

impl Error {
    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Wrap a failure to list a workload kind
    ///
    /// The retryable flag is derived from the wrapped error so callers can
    /// tell an expired token from a flaky connection.
    pub fn listing(kind: impl Into<String>, namespace: impl Into<String>, source: &Error) -> Self {
        Self::Listing {
            kind: kind.into(),
            namespace: namespace.into(),
            message: source.to_string(),
            retryable: source.is_retryable(),
        }
    }

    /// Create a cancellation error for the given step
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// 4xx API responses and serialization failures need a fix before a
    /// rerun can succeed; connection problems and 5xx responses may not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Serialization { .. } => false,
            Error::Listing { retryable, .. } => *retryable,
            Error::Cancelled { .. } => true,
        }
    }

    /// Whether this error is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}
