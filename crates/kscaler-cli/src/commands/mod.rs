//! CLI commands

use std::fmt::Display;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::{Error, Result};

pub mod format;
pub mod scale;

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
///
/// This reduces boilerplate for the common pattern of `.map_err(|e| Error::command_failed(e.to_string()))`.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed` using its Display implementation.
    fn cmd_err(self) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self) -> Result<T> {
        self.map_err(|e| Error::command_failed(e.to_string()))
    }
}

/// Build a kube [`Client`] for the given kubeconfig file and context.
///
/// Resolution:
/// 1. `kubeconfig`: explicit `--kubeconfig` path, else kube defaults
///    (`KUBECONFIG` env, which may list several files, or `~/.kube/config`)
/// 2. `context`: selected context, else the kubeconfig's current context
///
/// With neither set, falls back to `Client::try_default()`, which also
/// covers in-cluster service account credentials.
pub async fn resolve_kube_client(kubeconfig: Option<&str>, context: Option<&str>) -> Result<Client> {
    if kubeconfig.is_none() && context.is_none() {
        return Client::try_default().await.cmd_err();
    }

    let kc = match kubeconfig {
        Some(path) => Kubeconfig::read_from(path).map_err(|e| {
            Error::command_failed(format!("failed to read kubeconfig {}: {}", path, e))
        })?,
        None => Kubeconfig::read()
            .map_err(|e| Error::command_failed(format!("failed to read kubeconfig: {}", e)))?,
    };

    let opts = KubeConfigOptions {
        context: context.map(str::to_string),
        ..Default::default()
    };
    let config = Config::from_custom_kubeconfig(kc, &opts)
        .await
        .map_err(|e| match context {
            Some(ctx) => Error::command_failed(format!(
                "could not load kubeconfig context {:?}: {}",
                ctx, e
            )),
            None => Error::command_failed(e.to_string()),
        })?;
    Client::try_from(config).cmd_err()
}

/// Check that the API server answers before any workload is touched.
pub async fn ensure_connected(client: &Client) -> Result<()> {
    let info = client
        .apiserver_version()
        .await
        .map_err(|e| Error::command_failed(format!("could not reach the API server: {}", e)))?;
    debug!(version = %info.git_version, "connected to API server");
    Ok(())
}

/// Parse a human-friendly duration string.
///
/// Supports `Nh` (hours), `Nm` (minutes), `Ns` (seconds) and bare seconds.
/// Examples: "1h" → 3600s, "30m" → 1800s, "90" → 90s. Zero is rejected.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || {
        Error::validation(format!(
            "invalid duration '{}', expected e.g. 1h, 30m, 90s",
            s
        ))
    };
    let (digits, multiplier) = if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else if let Some(minutes) = s.strip_suffix('m') {
        (minutes, 60)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else {
        (s, 1)
    };
    let n: u64 = digits.parse().map_err(|_| invalid())?;
    let secs = n.checked_mul(multiplier).ok_or_else(invalid)?;
    if secs == 0 {
        return Err(Error::validation("duration must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}
