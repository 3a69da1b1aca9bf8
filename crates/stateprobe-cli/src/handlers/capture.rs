//! Capture command handler
//!
//! This is the hook a prepared fixture runs after its unit under test.

use crate::commands::CaptureArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use stateprobe::{CaptureConfig, HarnessConfig, Snapshot, SnapshotStore};

/// Capture settings from an optional harness configuration
pub fn capture_config(args: &CaptureArgs) -> CliResult<CaptureConfig> {
    Ok(match &args.config {
        Some(path) => HarnessConfig::load(path)?.capture,
        None => CaptureConfig::default(),
    })
}

/// Capture and persist the next snapshot
pub fn capture_into(store: &SnapshotStore, capture: &CaptureConfig) -> CliResult<Snapshot> {
    Ok(store.capture_next(capture)?)
}

/// Execute the capture command
pub fn execute_capture(config: &CliConfig, args: &CaptureArgs) -> CliResult<()> {
    let capture = capture_config(args)?;
    let store = SnapshotStore::new(&args.out);
    let snapshot = capture_into(&store, &capture)?;
    if !config.verbosity.is_quiet() {
        println!("{}", store.record_path(snapshot.checkpoint).display());
    }
    Ok(())
}
