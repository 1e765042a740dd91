//! Diagnose command.

use anyhow::Result;
use clap::Args;

use crate::output::{print_single, OutputFormat};

use super::CommandContext;

/// Per-pod report: container states and recent warning events.
#[derive(Debug, Args)]
pub struct DiagnoseArgs {
    /// Release name.
    release: String,

    /// Release namespace.
    #[arg(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Warning events shown per pod.
    #[arg(long)]
    events: Option<usize>,
}

impl DiagnoseArgs {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let supervisor = ctx.supervisor().await?;
        let mut reporter = supervisor.reporter();
        if let Some(limit) = self.events {
            reporter = reporter.with_event_limit(limit);
        }

        // Readiness mismatches are part of the report when they can be read.
        let report = match supervisor
            .poller()
            .snapshot_table(&self.namespace, &self.release)
            .await
        {
            Ok(table) => {
                reporter
                    .report_with_readiness(&self.namespace, &self.release, &table)
                    .await
            }
            Err(_) => reporter.report(&self.namespace, &self.release).await,
        };

        match ctx.format {
            OutputFormat::Json => print_single(&report),
            OutputFormat::Table => print!("{}", report),
        }
        Ok(())
    }
}
