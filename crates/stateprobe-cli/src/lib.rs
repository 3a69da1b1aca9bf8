//! Stateprobe CLI Library
//!
//! Command-line driver for the Stateprobe harness: plan, prepare, capture
//! and compare.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{CaptureArgs, Cli, ColorArg, Commands, CompareArgs, ListArgs, PrepareArgs};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::Reporter;
