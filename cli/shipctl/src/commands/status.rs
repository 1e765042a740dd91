//! Status command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use shipmate_cluster::{ClusterError, ReleaseRecord};
use shipmate_health::ReadinessTable;
use shipmate_reconcile::Deadline;
use shipmate_release::PollError;

use crate::duration::{format_duration, parse_duration};
use crate::error::CliError;
use crate::output::{print_info, print_readiness, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Show workload readiness, once or until ready.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Release name.
    release: String,

    /// Release namespace.
    #[arg(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Poll until every workload is ready or the timeout passes.
    #[arg(long)]
    wait: bool,

    /// Deadline for --wait, e.g. 90s, 5m.
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,
}

#[derive(Debug, Serialize)]
struct StatusView<'a> {
    release: &'a str,
    namespace: &'a str,
    record: Option<&'a ReleaseRecord>,
    ready: bool,
    readiness: &'a ReadinessTable,
}

impl StatusArgs {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let cluster = ctx.cluster().await?;
        let supervisor = ctx.supervisor_on(Arc::clone(&cluster))?;
        let read_error = |source: ClusterError| CliError::Read {
            release: self.release.clone(),
            namespace: self.namespace.clone(),
            source,
        };

        let record = cluster
            .find_release(&self.namespace, &self.release)
            .await
            .map_err(read_error)?;

        let poller = supervisor.poller();
        let table = if self.wait {
            let timeout = match self.timeout {
                Some(timeout) => timeout,
                None => ctx.config.timeout()?,
            };
            match poller
                .poll_until_ready(&self.namespace, &self.release, Deadline::after(timeout))
                .await
            {
                Ok(table) => table,
                Err(err) => {
                    let reason = match &err {
                        PollError::Timeout { .. } => {
                            format!("timed out after {}", format_duration(timeout))
                        }
                        PollError::Failed { resource, .. } => resource.to_string(),
                    };
                    return Err(CliError::NotReady {
                        release: self.release.clone(),
                        namespace: self.namespace.clone(),
                        reason,
                        table: err.table().clone(),
                    }
                    .into());
                }
            }
        } else {
            poller
                .snapshot_table(&self.namespace, &self.release)
                .await
                .map_err(read_error)?
        };

        match ctx.format {
            OutputFormat::Json => print_single(&StatusView {
                release: &self.release,
                namespace: &self.namespace,
                record: record.as_ref(),
                ready: table.all_ready(),
                readiness: &table,
            }),
            OutputFormat::Table => {
                match &record {
                    Some(record) => println!(
                        "release {} in namespace {}: revision {} ({})",
                        self.release, self.namespace, record.revision, record.status
                    ),
                    None => print_info(&format!(
                        "No release record for {} in namespace {}",
                        self.release, self.namespace
                    )),
                }
                print_readiness(&table, ctx.format);
                if self.wait {
                    print_success("All workloads are ready");
                }
            }
        }
        Ok(())
    }
}
