//! Run configuration
//!
//! Command-line arguments are validated into a [`RunConfig`] before any
//! network call, so a typo in the namespace or timeout never reaches the
//! cluster.

use std::time::Duration;

use kscaler::ScaleDirection;

use crate::commands::parse_duration;
use crate::commands::scale::ScaleArgs;
use crate::{Error, Result};

/// Maximum length of a namespace name (DNS-1123 label)
const MAX_NAMESPACE_LEN: usize = 63;

/// Validated settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Namespace whose workloads are scaled
    pub namespace: String,
    /// Direction applied to every workload
    pub direction: ScaleDirection,
    /// Kubeconfig context, current context when unset
    pub context: Option<String>,
    /// Explicit kubeconfig path, kube defaults when unset
    pub kubeconfig: Option<String>,
    /// Deadline after which no new step is started
    pub timeout: Option<Duration>,
}

impl RunConfig {
    /// Validate command-line arguments
    pub fn from_args(args: &ScaleArgs) -> Result<Self> {
        validate_namespace(&args.namespace)?;
        let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
        Ok(Self {
            namespace: args.namespace.clone(),
            direction: args.scale.into(),
            context: non_empty(args.context.as_deref()),
            kubeconfig: non_empty(args.kubeconfig.as_deref()),
            timeout,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Check that `namespace` is a valid DNS-1123 label
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(Error::validation("namespace is required"));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(Error::validation(format!(
            "namespace '{}' is longer than {} characters",
            namespace, MAX_NAMESPACE_LEN
        )));
    }
    let valid_chars = namespace
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = !namespace.starts_with('-') && !namespace.ends_with('-');
    if !valid_chars || !valid_edges {
        return Err(Error::validation(format!(
            "namespace '{}' must consist of lowercase alphanumeric characters or '-', \
             and must start and end with an alphanumeric character",
            namespace
        )));
    }
    Ok(())
}
