//! Config commands (defaults for helm, kube context and timings).

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{config_path, Config};
use crate::duration::format_duration;
use crate::output::{print_single, print_success, OutputFormat};

use super::CommandContext;

/// Show or edit CLI defaults.
#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
enum ConfigSubcommand {
    /// Show the effective configuration, environment overrides included.
    Show,

    /// Set one key in the config file.
    Set {
        /// One of: kube_context, helm_bin, timeout, history_max,
        /// poll_interval, watch_grace, pending_grace.
        key: String,
        value: String,
    },

    /// Print the config file path.
    Path,
}

impl ConfigCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            ConfigSubcommand::Show => show(ctx),
            ConfigSubcommand::Set { key, value } => set(ctx, &key, &value),
            ConfigSubcommand::Path => {
                println!("{}", config_path()?.display());
                Ok(())
            }
        }
    }
}

fn show(ctx: CommandContext) -> Result<()> {
    let config = &ctx.config;
    match ctx.format {
        OutputFormat::Json => print_single(config),
        OutputFormat::Table => {
            let settings = config.settings()?;
            println!("kube_context: {}", ctx.kube_context.as_deref().unwrap_or("-"));
            println!("helm_bin: {}", ctx.helm_bin);
            println!("timeout: {}", format_duration(config.timeout()?));
            println!("history_max: {}", config.history_max());
            println!("poll_interval: {}", format_duration(settings.poll_interval));
            println!("watch_grace: {}", format_duration(settings.watch_grace));
            println!("pending_grace: {}", format_duration(settings.pending_grace));
        }
    }
    Ok(())
}

fn set(ctx: CommandContext, key: &str, value: &str) -> Result<()> {
    // Edit the file alone so environment overrides are not persisted.
    let mut config = Config::load_file()?;
    config.set(key, value)?;
    config.save()?;

    match ctx.format {
        OutputFormat::Json => print_single(&config),
        OutputFormat::Table => print_success(&format!("Set {} = {}", key, value)),
    }
    Ok(())
}
