//! CLI commands.

mod config;
mod diagnose;
mod release;
mod rollback;
mod status;

use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use shipmate_cluster::{ClusterAccessor, KubeAccessor};
use shipmate_release::{HelmCli, Supervisor};

use crate::config::Config;
use crate::error::CliError;
use crate::logging::LogFormat;
use crate::output::OutputFormat;

/// shipctl - install, upgrade and roll back Helm releases with live health
/// verification.
#[derive(Debug, Parser)]
#[command(name = "shipctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, short = 'o', global = true, value_enum, default_value_t)]
    output: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Log line format on stderr.
    #[arg(long, global = true, value_enum, default_value_t)]
    log_format: LogFormat,

    /// Kubeconfig context to use.
    #[arg(long, global = true)]
    kube_context: Option<String>,

    /// Helm binary to run.
    #[arg(long, global = true)]
    helm_bin: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Install the release, or upgrade it if it already exists.
    Deploy(release::ReleaseArgs),

    /// Install a release that does not exist yet.
    Install(release::ReleaseArgs),

    /// Upgrade an existing release.
    Upgrade(release::ReleaseArgs),

    /// Roll a release back to an earlier revision.
    Rollback(rollback::RollbackArgs),

    /// Show workload readiness for a release.
    Status(status::StatusArgs),

    /// Print a per-pod diagnostic report for a release.
    Diagnose(diagnose::DiagnoseArgs),

    /// Show or edit CLI defaults.
    Config(config::ConfigCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let config = Config::load()?;

        // Flags win over environment and config file.
        let ctx = CommandContext {
            kube_context: self.kube_context.or_else(|| config.kube_context.clone()),
            helm_bin: self
                .helm_bin
                .unwrap_or_else(|| config.helm_bin().to_string()),
            format: self.output,
            config,
        };

        match self.command {
            Commands::Deploy(args) => release::deploy(ctx, args).await,
            Commands::Install(args) => release::install(ctx, args).await,
            Commands::Upgrade(args) => release::upgrade(ctx, args).await,
            Commands::Rollback(args) => args.run(ctx).await,
            Commands::Status(args) => args.run(ctx).await,
            Commands::Diagnose(args) => args.run(ctx).await,
            Commands::Config(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("shipctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    pub kube_context: Option<String>,
    pub helm_bin: String,
}

impl CommandContext {
    /// Connect to the cluster named by the resolved kube context.
    pub async fn cluster(&self) -> Result<Arc<dyn ClusterAccessor>> {
        let accessor = KubeAccessor::connect(self.kube_context.as_deref())
            .await
            .map_err(CliError::Connect)?;
        Ok(Arc::new(accessor))
    }

    pub fn package_manager(&self) -> HelmCli {
        HelmCli::new(&self.helm_bin).with_kube_context(self.kube_context.clone())
    }

    /// A supervisor wired to the live cluster and the helm binary.
    pub async fn supervisor(&self) -> Result<Supervisor> {
        let cluster = self.cluster().await?;
        self.supervisor_on(cluster)
    }

    pub fn supervisor_on(&self, cluster: Arc<dyn ClusterAccessor>) -> Result<Supervisor> {
        Ok(Supervisor::new(
            cluster,
            Arc::new(self.package_manager()),
            self.config.settings()?,
        ))
    }
}
