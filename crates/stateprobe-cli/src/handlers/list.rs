//! List command handler

use crate::commands::ListArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::Reporter;
use serde::Serialize;
use stateprobe::{HarnessConfig, Mutation};

/// One planned run, as printed by `list --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRun {
    /// Fixture name
    pub fixture: String,
    /// Mutation id
    pub mutation: &'static str,
    /// Mutation description
    pub description: &'static str,
}

/// Flatten every fixture's plan
pub fn planned_runs(harness: &HarnessConfig) -> CliResult<Vec<PlannedRun>> {
    let mut runs = Vec::new();
    for fixture in &harness.fixtures {
        for mutation in harness.plan_for(fixture)?.entries() {
            runs.push(PlannedRun {
                fixture: fixture.name.clone(),
                mutation: mutation.id(),
                description: Mutation::description(mutation),
            });
        }
    }
    Ok(runs)
}

/// Execute the list command
pub fn execute_list(config: &CliConfig, args: &ListArgs) -> CliResult<()> {
    let harness = HarnessConfig::load(&args.config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&planned_runs(&harness)?)?);
        return Ok(());
    }
    let reporter = Reporter::new(config.color.should_color(), config.verbosity.is_quiet());
    for fixture in &harness.fixtures {
        reporter.plan(&fixture.name, &harness.plan_for(fixture)?);
    }
    Ok(())
}
