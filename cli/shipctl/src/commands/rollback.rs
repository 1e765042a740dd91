//! Rollback command.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use shipmate_release::ReleaseDescriptor;

use crate::duration::parse_duration;
use crate::output::print_result;

use super::CommandContext;

/// Roll a release back and verify the result.
#[derive(Debug, Args)]
pub struct RollbackArgs {
    /// Release name.
    release: String,

    /// Revision to roll back to; defaults to the previous one.
    revision: Option<u32>,

    /// Release namespace.
    #[arg(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Return once helm returns, without verifying workload health.
    #[arg(long)]
    no_wait: bool,

    /// Overall deadline, e.g. 90s, 5m, 1m30s.
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Revisions helm keeps.
    #[arg(long)]
    history_max: Option<u32>,
}

impl RollbackArgs {
    fn descriptor(&self, ctx: &CommandContext) -> Result<ReleaseDescriptor> {
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => ctx.config.timeout()?,
        };
        // helm rollback reuses the chart of the target revision; the
        // release name stands in for it in messages.
        let mut descriptor = ReleaseDescriptor::new(&self.release, &self.namespace, &self.release)
            .with_timeout(timeout)
            .with_wait(!self.no_wait);
        descriptor.history_max = self
            .history_max
            .unwrap_or_else(|| ctx.config.history_max());
        Ok(descriptor)
    }

    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let descriptor = self.descriptor(&ctx)?;
        let result = ctx
            .supervisor()
            .await?
            .rollback(&descriptor, self.revision)
            .await?;
        print_result(&result, ctx.format);
        Ok(())
    }
}
