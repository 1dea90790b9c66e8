//! # kabal CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use kabal_cli::behandling::{run_behandling, BehandlingArgs};
use kabal_cli::demo::{run_demo, DemoArgs};
use kabal_service::telemetry;
use kabal_service::KabalConfig;

/// Appeals case core tooling.
#[derive(Parser, Debug)]
#[command(name = "kabal", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON. Overrides KABAL_LOG_JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Work with case and intake files.
    Behandling(BehandlingArgs),

    /// Run a complete case against in-memory collaborators.
    Demo(DemoArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match KabalConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("kabal: {e}");
            return ExitCode::from(2);
        }
    };
    telemetry::init(
        telemetry::filter_for_verbosity(cli.verbose),
        cli.log_json || config.log_json,
    );

    tracing::debug!("kabal CLI starting");

    let result = match cli.command {
        Commands::Behandling(args) => run_behandling(&args),
        Commands::Demo(args) => run_demo(&args, config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("kabal: {e:#}");
            ExitCode::from(1)
        }
    }
}
