//! vmctl certificate provisioning binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vmctl_cli::cli::{Cli, Commands};
use vmctl_cli::commands::{ExportCommand, ImportCommand, InspectCommand, ProvisionCommand};
use vmctl_cli::output::OutputFormat;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), vmctl_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Provision(args) => {
            ProvisionCommand::new().execute(&mut stdout, &format, &args)?;
        }
        Commands::Inspect(args) => {
            InspectCommand::new().execute(&mut stdout, &format, &args)?;
        }
        Commands::Export(args) => {
            ExportCommand::new().execute(&mut stdout, &args)?;
        }
        Commands::Import(args) => {
            ImportCommand::new().execute(&mut stdout, &format, &args)?;
        }
    }

    Ok(())
}
