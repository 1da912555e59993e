mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_tracing();

    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let outcome = commands::run(&cli).await?;
    if let Some(data) = &outcome.data {
        output::render(data, cli.pretty)?;
    }

    if outcome.partial_failure {
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::SUCCESS)
}
