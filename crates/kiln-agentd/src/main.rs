use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use kiln_observe::{LoggerConfig, logger_init};
use tracing::info;

mod cli;
mod commands;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let log = LoggerConfig::new(cli.global.log_format, cli.global.log_level.clone())
        .with_debug(cli.global.debug);
    logger_init(&log).context("initializing logger")?;
    info!(format = %log.format, debug = log.debug, "logger initialized");

    match cli.command {
        Command::Run(args) => commands::run(args, cli.global.debug).await,
        Command::Env(cmd) => commands::env(cmd).await.map(|()| ExitCode::SUCCESS),
    }
}
