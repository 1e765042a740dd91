//! shipctl - release execution with live health verification.
//!
//! Drives Helm installs, upgrades and rollbacks while watching the
//! release's workloads, and explains every failure with a per-pod report.

use anyhow::Result;
use clap::Parser;

mod commands;
mod config;
mod duration;
mod error;
mod logging;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbosity(), cli.log_format());

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
