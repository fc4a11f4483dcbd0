//! kscaler CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use clap::Parser;

/// kscaler - pause and resume every workload in a namespace
///
/// Scaling down records each Deployment's and StatefulSet's replica count in
/// the `k8s.dev.scaler/desired.replicas` annotation before scaling it to
/// zero. Scaling up restores the recorded counts.
#[derive(Parser, Debug)]
#[command(name = "kscaler")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub args: commands::scale::ScaleArgs,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        commands::scale::run(self.args).await
    }
}
