//! Deploy, install and upgrade commands.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use shipmate_release::{ChartRef, ReleaseAction, ReleaseDescriptor, ValueOverlays};
use tracing::debug;

use crate::duration::parse_duration;
use crate::output::print_result;

use super::CommandContext;

/// Release target and how to drive it.
#[derive(Debug, Args)]
pub struct ReleaseArgs {
    /// Release name.
    release: String,

    /// Chart reference (path, repo/name, or OCI URL).
    chart: String,

    /// Target namespace.
    #[arg(long, short = 'n', default_value = "default")]
    namespace: String,

    /// Values file; repeatable, later files win.
    #[arg(long = "values", short = 'f')]
    values: Vec<PathBuf>,

    /// Value override as key=value; repeatable, applied after files.
    #[arg(long = "set", value_parser = parse_set)]
    set: Vec<(String, String)>,

    /// Chart version constraint.
    #[arg(long)]
    version: Option<String>,

    /// Chart repository URL.
    #[arg(long)]
    repo: Option<String>,

    /// Let helm roll back a failed install or upgrade.
    #[arg(long)]
    atomic: bool,

    /// Return once helm returns, without verifying workload health.
    #[arg(long)]
    no_wait: bool,

    /// Overall deadline, e.g. 90s, 5m, 1m30s.
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Revisions helm keeps for upgrades.
    #[arg(long)]
    history_max: Option<u32>,

    /// Create the namespace if it is missing.
    #[arg(long)]
    create_namespace: bool,
}

fn parse_set(expr: &str) -> Result<(String, String), String> {
    ValueOverlays::parse_override(expr).map_err(|e| e.to_string())
}

impl ReleaseArgs {
    pub fn descriptor(&self, ctx: &CommandContext) -> Result<ReleaseDescriptor> {
        let timeout = match self.timeout {
            Some(timeout) => timeout,
            None => ctx.config.timeout()?,
        };

        let mut chart = ChartRef::new(&self.chart);
        chart.version = self.version.clone();
        chart.repo = self.repo.clone();

        let mut descriptor = ReleaseDescriptor::new(&self.release, &self.namespace, &self.chart)
            .with_timeout(timeout)
            .with_wait(!self.no_wait)
            .with_atomic(self.atomic)
            .with_create_namespace(self.create_namespace);
        descriptor.chart = chart;
        descriptor.values = ValueOverlays {
            files: self.values.clone(),
            set: self.set.clone(),
        };
        descriptor.history_max = self
            .history_max
            .unwrap_or_else(|| ctx.config.history_max());

        debug!(?descriptor, "Built release descriptor");
        Ok(descriptor)
    }
}

pub async fn deploy(ctx: CommandContext, args: ReleaseArgs) -> Result<()> {
    let descriptor = args.descriptor(&ctx)?;
    let result = ctx.supervisor().await?.execute(&descriptor).await?;
    print_result(&result, ctx.format);
    Ok(())
}

pub async fn install(ctx: CommandContext, args: ReleaseArgs) -> Result<()> {
    run_as(ctx, args, ReleaseAction::Install).await
}

pub async fn upgrade(ctx: CommandContext, args: ReleaseArgs) -> Result<()> {
    run_as(ctx, args, ReleaseAction::Upgrade).await
}

async fn run_as(ctx: CommandContext, args: ReleaseArgs, action: ReleaseAction) -> Result<()> {
    let descriptor = args.descriptor(&ctx)?;
    let result = ctx
        .supervisor()
        .await?
        .execute_as(&descriptor, action)
        .await?;
    print_result(&result, ctx.format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::output::OutputFormat;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        args: ReleaseArgs,
    }

    fn ctx(config: Config) -> CommandContext {
        CommandContext {
            config,
            format: OutputFormat::Table,
            kube_context: None,
            helm_bin: "helm".to_string(),
        }
    }

    fn parse(argv: &[&str]) -> ReleaseArgs {
        let mut full = vec!["release"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_descriptor_from_flags() {
        let args = parse(&[
            "web",
            "bitnami/nginx",
            "-n",
            "prod",
            "-f",
            "base.yaml",
            "-f",
            "prod.yaml",
            "--set",
            "image.tag=1.2.3",
            "--version",
            "15.0.0",
            "--atomic",
            "--timeout",
            "1m30s",
            "--create-namespace",
        ]);
        let descriptor = args.descriptor(&ctx(Config::default())).unwrap();

        assert_eq!(descriptor.name, "web");
        assert_eq!(descriptor.namespace, "prod");
        assert_eq!(descriptor.chart.reference, "bitnami/nginx");
        assert_eq!(descriptor.chart.version.as_deref(), Some("15.0.0"));
        assert_eq!(
            descriptor.values.files,
            vec![PathBuf::from("base.yaml"), PathBuf::from("prod.yaml")]
        );
        assert_eq!(
            descriptor.values.set,
            vec![("image.tag".to_string(), "1.2.3".to_string())]
        );
        assert!(descriptor.atomic);
        assert!(descriptor.wait);
        assert!(descriptor.create_namespace);
        assert_eq!(descriptor.timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_config_supplies_defaults() {
        let mut config = Config::default();
        config.set("timeout", "2m").unwrap();
        config.set("history_max", "4").unwrap();

        let descriptor = parse(&["web", "./chart", "--no-wait"])
            .descriptor(&ctx(config))
            .unwrap();

        assert_eq!(descriptor.namespace, "default");
        assert_eq!(descriptor.timeout, Duration::from_secs(120));
        assert_eq!(descriptor.history_max, 4);
        assert!(!descriptor.wait);
    }

    #[test]
    fn test_malformed_set_is_a_usage_error() {
        let err = Harness::try_parse_from(["release", "web", "./chart", "--set", "noequals"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
