//! Compare command handler

use crate::commands::CompareArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::Reporter;
use stateprobe::{evaluate, BatchReport, HarnessConfig};

/// Turn a report into the command's result
pub fn verdict(report: &BatchReport) -> CliResult<()> {
    let count = report.findings().count();
    if count == 0 {
        Ok(())
    } else {
        Err(CliError::Findings { count })
    }
}

/// Execute the compare command
pub fn execute_compare(config: &CliConfig, args: &CompareArgs) -> CliResult<()> {
    let harness = HarnessConfig::load(&args.config)?;
    let report = evaluate(&args.output, &harness)?;
    tracing::info!(
        output = %args.output.display(),
        runs = report.runs.len(),
        findings = report.has_findings(),
        "output tree evaluated"
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let reporter = Reporter::new(config.color.should_color(), config.verbosity.is_quiet());
        reporter.report(&report);
    }
    verdict(&report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use stateprobe::{ComparisonOutcome, RunOutcome, RunRecord};

    fn report(outcome: RunOutcome) -> BatchReport {
        BatchReport {
            runs: vec![RunRecord {
                fixture: "nginx".into(),
                run: "dry_run000000000".into(),
                outcome,
            }],
        }
    }

    #[test]
    fn test_clean_verdict() {
        assert!(verdict(&report(RunOutcome::Compared(ComparisonOutcome::default()))).is_ok());
        assert!(verdict(&BatchReport::default()).is_ok());
    }

    #[test]
    fn test_failed_run_is_a_finding() {
        let err = verdict(&report(RunOutcome::Failed {
            error: "missing snapshots".into(),
        }))
        .unwrap_err();
        assert!(matches!(err, CliError::Findings { count: 1 }));
    }
}
