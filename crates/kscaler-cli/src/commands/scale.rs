//! `kscaler --namespace <ns> --scale <up|down>` - scale every workload in a namespace

use std::time::Duration;

use clap::{Args, ValueEnum};
use kscaler::{RunSummary, ScaleDirection, ScalerFactory};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::format::{print_table, summary_rows, OutputFormat, SUMMARY_HEADERS};
use super::{ensure_connected, resolve_kube_client};
use crate::config::RunConfig;
use crate::{Error, Result};

/// Scale arguments
#[derive(Args, Debug)]
pub struct ScaleArgs {
    /// Namespace whose Deployments and StatefulSets are scaled
    #[arg(short, long)]
    pub namespace: String,

    /// Direction: `down` records replica counts and scales to zero, `up` restores them
    #[arg(short, long, value_enum)]
    pub scale: Direction,

    /// Kubeconfig context to use (default: current context)
    #[arg(long)]
    pub context: Option<String>,

    /// Path to kubeconfig file (default: $KUBECONFIG or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Stop starting new steps after this long (e.g. 90s, 5m, 1h)
    #[arg(long)]
    pub timeout: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,
}

/// Scale direction as accepted on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    /// Restore recorded replica counts
    Up,
    /// Record replica counts and scale to zero
    Down,
}

impl From<Direction> for ScaleDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => ScaleDirection::Up,
            Direction::Down => ScaleDirection::Down,
        }
    }
}

/// Run the scale command
pub async fn run(args: ScaleArgs) -> Result<()> {
    let config = RunConfig::from_args(&args)?;

    let client =
        resolve_kube_client(config.kubeconfig.as_deref(), config.context.as_deref()).await?;
    ensure_connected(&client).await?;

    let cancel = CancellationToken::new();
    spawn_cancellation(&cancel, config.timeout);

    let factory = ScalerFactory::new(client, &config.namespace);
    let summary = factory.run(config.direction, &cancel).await;
    cancel.cancel();

    match args.output {
        OutputFormat::Table => {
            if summary.reports().next().is_some() {
                print_table(SUMMARY_HEADERS, &summary_rows(&summary));
            } else if summary.stopped.is_none() {
                println!("No workloads found in namespace {}.", summary.namespace);
            }
            if let Some(line) = stopped_line(&summary) {
                println!("{}", line);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    check_summary(&summary)
}

/// Cancel the run on Ctrl-C or when the deadline passes
///
/// Both tasks exit once the token is cancelled.
fn spawn_cancellation(cancel: &CancellationToken, timeout: Option<Duration>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    warn!("interrupted, finishing in-flight steps");
                }
                token.cancel();
            }
        }
    });

    if let Some(timeout) = timeout {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    warn!(timeout_secs = timeout.as_secs(), "timeout reached, finishing in-flight steps");
                    token.cancel();
                }
            }
        });
    }
}

/// Trailer naming the kind a run stopped at, if it stopped early
fn stopped_line(summary: &RunSummary) -> Option<String> {
    summary.stopped.as_ref().map(|stopped| {
        format!(
            "Stopped before {}s were processed: {}",
            stopped.kind, stopped.error
        )
    })
}

/// Turn a summary with unscaled workloads into an error
///
/// A run that stopped early is reported first: its kind never ran, so the
/// workload counts alone would understate what was skipped.
fn check_summary(summary: &RunSummary) -> Result<()> {
    if let Some(stopped) = &summary.stopped {
        return Err(Error::RunStopped {
            kind: stopped.kind.to_string(),
            message: stopped.error.clone(),
        });
    }
    let total = summary.reports().count();
    let failed = summary.failures().len();
    if failed > 0 {
        return Err(Error::PartialFailure { failed, total });
    }
    info!(namespace = %summary.namespace, scaled = total, "all workloads scaled");
    Ok(())
}
