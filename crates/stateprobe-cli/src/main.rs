//! Stateprobe CLI: differential mutation testing for infrastructure fixtures
//!
//! ## Usage
//!
//! ```bash
//! stateprobe list --config stateprobe.yml
//! stateprobe prepare --fixture nginx --mutation dry_run --dest host/mnt/test
//! stateprobe capture --out /mnt/snapshots
//! stateprobe compare --config stateprobe.yml --output output
//! ```

use clap::Parser;
use stateprobe_cli::{
    handlers::{execute_capture, execute_compare, execute_list, execute_prepare},
    logging::init_tracing,
    Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    init_tracing(&config);

    match &cli.command {
        Commands::List(args) => execute_list(&config, args),
        Commands::Prepare(args) => execute_prepare(&config, args),
        Commands::Capture(args) => execute_capture(&config, args),
        Commands::Compare(args) => execute_compare(&config, args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.into();

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_log_json(cli.log_json)
}
