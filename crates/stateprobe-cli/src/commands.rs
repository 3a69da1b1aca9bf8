//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Stateprobe: differential mutation testing for Ansible roles and Puppet specs
#[derive(Parser, Debug)]
#[command(name = "stateprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit log lines as JSON
    #[arg(long, global = true, env = "STATEPROBE_LOG_JSON")]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the mutation plan of every fixture
    List(ListArgs),

    /// Copy a fixture, install the capture hook and apply one mutation
    Prepare(PrepareArgs),

    /// Capture system state and persist the next numbered snapshot
    Capture(CaptureArgs),

    /// Compare every mutated run of an output tree against its baseline
    Compare(CompareArgs),
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Harness configuration file
    #[arg(short, long, default_value = "stateprobe.yml")]
    pub config: PathBuf,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the prepare command
#[derive(Parser, Debug)]
pub struct PrepareArgs {
    /// Harness configuration file
    #[arg(short, long, default_value = "stateprobe.yml")]
    pub config: PathBuf,

    /// Fixture name
    #[arg(short, long)]
    pub fixture: String,

    /// Mutation id from the fixture's plan
    #[arg(short, long, default_value = "no_transformation")]
    pub mutation: String,

    /// Where the mutable copy is written
    #[arg(short, long)]
    pub dest: PathBuf,

    /// Capture hook copied into the fixture (defaults to this executable)
    #[arg(long)]
    pub instrumentation: Option<PathBuf>,

    /// Arguments the fixture passes to the capture hook
    #[arg(long, default_value = "capture --out /mnt/snapshots")]
    pub capture_args: String,

    /// Override the configured seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Repetition index, added to the seed
    #[arg(long, default_value = "0")]
    pub repetition: u64,

    /// Output tree; prints the run directory the backend should fill
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the capture command
#[derive(Parser, Debug)]
pub struct CaptureArgs {
    /// Snapshot directory
    #[arg(short, long, default_value = "/mnt/snapshots")]
    pub out: PathBuf,

    /// Harness configuration file providing capture settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the compare command
#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// Harness configuration file
    #[arg(short, long, default_value = "stateprobe.yml")]
    pub config: PathBuf,

    /// Output tree of executed runs
    #[arg(short, long, default_value = "output")]
    pub output: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Color argument for CLI
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
