//! dlock command line client.
//!
//! Loads the backend configuration, connects, runs one command and closes
//! the connection.

mod cli;
mod commands;
mod startup;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;

use dlock_core::{LockClient, LockConfig};

use crate::cli::Cli;

/// Exit code for configuration, connection and store failures
const EXIT_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging_config = startup::LoggingConfig::from_env().with_verbosity(cli.verbose);
    let _logging_guard = match startup::init_logging(&logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            if commands::is_ownership_error(&e) {
                ExitCode::from(1)
            } else {
                ExitCode::from(EXIT_FAILURE)
            }
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = LockConfig::load(&cli.config)
        .with_context(|| format!("load {}", cli.config.display()))?;
    let client = LockClient::connect(&config).await?;
    let lock = client.new_lock();

    let mut stdout = std::io::stdout().lock();
    let result = commands::execute(&cli.command, lock.as_ref(), &mut stdout).await;
    client.close().await?;
    result
}
