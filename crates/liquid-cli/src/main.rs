mod cli;
mod cmd;
mod error;
mod io;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub use cli::{Cli, Command, OutputFormat, PathOrStdin};

use crate::error::CliError;

/// Environment variable holding a `tracing` filter directive.
const LOG_ENV: &str = "LIQUID_LOG";

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.message());
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

/// Logs to stderr. `LIQUID_LOG` wins over the verbosity flags.
fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<(), CliError> {
    if let Command::Version = cli.command {
        println!("{}", liquid_core::version());
        return Ok(());
    }

    let config = cmd::load_config(
        cli.config.as_deref(),
        cli.time_limit,
        cli.epsilon,
        cli.max_file_size,
    )?;
    match &cli.command {
        Command::Round {
            file,
            mechanism,
            flow,
        } => cmd::round::run(
            file,
            (*mechanism).into(),
            flow.as_deref(),
            &config,
            cli.format,
            cli.max_file_size,
        ),
        Command::Solve { file } => cmd::solve::run(file, &config, cli.format, cli.max_file_size),
        Command::Version => Ok(()),
    }
}
