//! Batch evaluation of an output tree.
//!
//! Runs land in `output/<fixture>/<mutation><seq>/`, where `<seq>` is a
//! nine-digit counter. Each fixture's `no_transformation` run is its
//! baseline; every other run is compared against it. A run that cannot be
//! evaluated is recorded as failed and never reported clean.

use crate::compare::{BaselineRegistry, ComparisonOutcome, RunKind, RunResult};
use crate::config::HarnessConfig;
use crate::mutation::Mutation;
use crate::result::{HarnessError, HarnessResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Digits of the run counter in a run directory name.
pub const SEQ_DIGITS: usize = 9;

/// Run directory name for the `seq`-th run of `mutation`
#[must_use]
pub fn run_dir_name(mutation: &str, seq: u64) -> String {
    format!("{mutation}{seq:0width$}", width = SEQ_DIGITS)
}

/// Split a run directory name into mutation id and counter
#[must_use]
pub fn parse_run_dir_name(name: &str) -> Option<(&str, u64)> {
    let split = name.len().checked_sub(SEQ_DIGITS)?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (mutation, seq) = name.split_at(split);
    if mutation.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((mutation, seq.parse().ok()?))
}

/// Next free run directory for `mutation` below `fixture_dir`
pub fn next_run_dir(fixture_dir: &Path, mutation: &str) -> HarnessResult<PathBuf> {
    let mut next = 0;
    if fixture_dir.is_dir() {
        for entry in fs::read_dir(fixture_dir)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if let Some((id, seq)) = parse_run_dir_name(&name) {
                if id == mutation {
                    next = next.max(seq + 1);
                }
            }
        }
    }
    Ok(fixture_dir.join(run_dir_name(mutation, next)))
}

/// Result of evaluating one mutated run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunOutcome {
    /// Compared against the baseline
    Compared(ComparisonOutcome),
    /// Could not be evaluated
    Failed {
        /// Error message
        error: String,
    },
}

impl RunOutcome {
    /// Whether the run needs attention
    #[must_use]
    pub const fn is_finding(&self) -> bool {
        match self {
            Self::Compared(outcome) => !outcome.is_clean(),
            Self::Failed { .. } => true,
        }
    }
}

/// One evaluated run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    /// Fixture name
    pub fixture: String,
    /// Run directory name
    pub run: String,
    /// Evaluation result
    pub outcome: RunOutcome,
}

/// Every evaluated run of an output tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Records in fixture, then run order
    pub runs: Vec<RunRecord>,
}

impl BatchReport {
    /// Whether any run crashed, diverged or failed
    #[must_use]
    pub fn has_findings(&self) -> bool {
        self.runs.iter().any(|r| r.outcome.is_finding())
    }

    /// Runs that need attention
    pub fn findings(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs.iter().filter(|r| r.outcome.is_finding())
    }

    /// Counts of (clean, crashed, diverged, failed) runs
    #[must_use]
    pub fn tally(&self) -> (usize, usize, usize, usize) {
        let mut tally = (0, 0, 0, 0);
        for record in &self.runs {
            match &record.outcome {
                RunOutcome::Compared(o) if o.is_clean() => tally.0 += 1,
                RunOutcome::Compared(o) => {
                    tally.1 += usize::from(o.crashed);
                    tally.2 += usize::from(o.diverged);
                }
                RunOutcome::Failed { .. } => tally.3 += 1,
            }
        }
        tally
    }
}

fn sorted_dirs(dir: &Path) -> HarnessResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Evaluate every fixture directory below `output`
pub fn evaluate(output: &Path, config: &HarnessConfig) -> HarnessResult<BatchReport> {
    if !output.is_dir() {
        return Err(HarnessError::MissingArtifacts {
            path: output.to_path_buf(),
        });
    }
    let mut report = BatchReport::default();
    for fixture_dir in sorted_dirs(output)? {
        let fixture = dir_name(&fixture_dir);
        let marker = config
            .fixture(&fixture)
            .map(|f| f.kind.adapter().success_marker());
        let runs = sorted_dirs(&fixture_dir)?;
        let (baselines, mutated): (Vec<_>, Vec<_>) = runs.into_iter().partition(|dir| {
            parse_run_dir_name(&dir_name(dir))
                .is_some_and(|(id, _)| id == Mutation::NoTransformation.id())
        });

        let mut registry = BaselineRegistry::new();
        let mut baseline_error = None;
        for dir in &baselines {
            let recorded = RunResult::load(dir, &fixture, dir_name(dir), RunKind::Baseline)
                .and_then(|run| registry.record(run));
            if let Err(e) = recorded {
                if baseline_error.is_none() {
                    baseline_error = Some(e.to_string());
                }
            }
        }

        for dir in mutated {
            let run = dir_name(&dir);
            let evaluated = match (&marker, &baseline_error) {
                (Err(e), _) => Err(e.to_string()),
                (_, Some(e)) => Err(format!("baseline unusable: {e}")),
                (Ok(marker), None) => RunResult::load(&dir, &fixture, &run, RunKind::Mutated)
                    .and_then(|result| registry.compare(&result, marker))
                    .map_err(|e| e.to_string()),
            };
            let outcome = match evaluated {
                Ok(outcome) => {
                    if !outcome.is_clean() {
                        tracing::info!(
                            %fixture,
                            %run,
                            crashed = outcome.crashed,
                            diverged = outcome.diverged,
                            "finding"
                        );
                    }
                    RunOutcome::Compared(outcome)
                }
                Err(error) => {
                    tracing::error!(%fixture, %run, %error, "run could not be evaluated");
                    RunOutcome::Failed { error }
                }
            };
            report.runs.push(RunRecord {
                fixture: fixture.clone(),
                run,
                outcome,
            });
        }
    }
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::compare::{LOG_FILE, SNAPSHOT_DIR};
    use crate::config::FixtureConfig;
    use crate::dialect::DialectKind;
    use crate::snapshot::{Snapshot, SnapshotStore};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn config() -> HarnessConfig {
        HarnessConfig::default()
            .with_fixture(FixtureConfig::new("nginx", DialectKind::TaskList, "roles/nginx"))
            .with_fixture(FixtureConfig::new("apache", DialectKind::ManifestCall, "apache"))
    }

    fn write_run(output: &Path, fixture: &str, run: &str, log: &str, states: &[&str]) {
        let dir = output.join(fixture).join(run);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(LOG_FILE), log).unwrap();
        let store = SnapshotStore::new(dir.join(SNAPSHOT_DIR));
        fs::create_dir_all(store.dir()).unwrap();
        for (i, value) in states.iter().enumerate() {
            let mut env = BTreeMap::new();
            env.insert("V".to_string(), (*value).to_string());
            store.write(&Snapshot::new(i as u64).with_env(env)).unwrap();
        }
    }

    #[test]
    fn test_run_dir_names() {
        assert_eq!(run_dir_name("dry_run", 3), "dry_run000000003");
        assert_eq!(parse_run_dir_name("dry_run000000003"), Some(("dry_run", 3)));
        assert_eq!(
            parse_run_dir_name("change_field000000012"),
            Some(("change_field", 12))
        );
        assert_eq!(parse_run_dir_name("dry_run"), None);
        assert_eq!(parse_run_dir_name("000000001"), None);
        assert_eq!(parse_run_dir_name("dry_run00000000x"), None);
    }

    #[test]
    fn test_next_run_dir() {
        let tmp = TempDir::new().unwrap();
        let fixture = tmp.path().join("nginx");
        assert!(next_run_dir(&fixture, "dry_run")
            .unwrap()
            .ends_with("dry_run000000000"));
        fs::create_dir_all(fixture.join("change_field000000000")).unwrap();
        fs::create_dir_all(fixture.join("change_field000000004")).unwrap();
        fs::create_dir_all(fixture.join("change_filenames000000009")).unwrap();
        assert!(next_run_dir(&fixture, "change_field")
            .unwrap()
            .ends_with("change_field000000005"));
    }

    #[test]
    fn test_evaluate_tree() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path();
        write_run(out, "nginx", "no_transformation000000000", "failed=0", &["A", "B"]);
        write_run(out, "nginx", "dry_run000000000", "failed=0", &["A", "B"]);
        write_run(out, "nginx", "change_field000000000", "failed=0", &["A", "C"]);
        write_run(out, "nginx", "idempotency000000000", "failed=1", &["A", "B"]);

        let report = evaluate(out, &config()).unwrap();
        assert_eq!(report.runs.len(), 3);
        assert!(report.has_findings());
        assert_eq!(report.tally(), (1, 1, 1, 0));
        let findings: Vec<_> = report.findings().map(|r| r.run.as_str()).collect();
        assert_eq!(findings, ["change_field000000000", "idempotency000000000"]);
    }

    #[test]
    fn test_missing_snapshots_is_failed_not_clean() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path();
        write_run(out, "apache", "no_transformation000000000", " 0 failures", &["A"]);
        let broken = out.join("apache/dry_run000000000");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(LOG_FILE), " 0 failures").unwrap();

        let report = evaluate(out, &config()).unwrap();
        assert_eq!(report.runs.len(), 1);
        assert!(matches!(report.runs[0].outcome, RunOutcome::Failed { .. }));
        assert!(report.has_findings());
    }

    #[test]
    fn test_missing_baseline_fails_runs() {
        let tmp = TempDir::new().unwrap();
        write_run(tmp.path(), "nginx", "dry_run000000000", "failed=0", &["A"]);
        let report = evaluate(tmp.path(), &config()).unwrap();
        match &report.runs[0].outcome {
            RunOutcome::Failed { error } => assert!(error.contains("No baseline")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_baseline_fails_runs() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path();
        write_run(out, "nginx", "no_transformation000000000", "failed=0", &["A"]);
        write_run(out, "nginx", "no_transformation000000001", "failed=0", &["A"]);
        write_run(out, "nginx", "dry_run000000000", "failed=0", &["A"]);
        let report = evaluate(out, &config()).unwrap();
        assert!(matches!(report.runs[0].outcome, RunOutcome::Failed { .. }));
    }

    #[test]
    fn test_unconfigured_fixture_fails_runs() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path();
        write_run(out, "mysql", "no_transformation000000000", "failed=0", &["A"]);
        write_run(out, "mysql", "dry_run000000000", "failed=0", &["A"]);
        let report = evaluate(out, &config()).unwrap();
        assert_eq!(report.tally(), (0, 0, 0, 1));
    }

    #[test]
    fn test_missing_output_dir() {
        let tmp = TempDir::new().unwrap();
        let err = evaluate(&tmp.path().join("output"), &config()).unwrap_err();
        assert!(matches!(err, HarnessError::MissingArtifacts { .. }));
    }

    #[test]
    fn test_report_serializes() {
        let report = BatchReport {
            runs: vec![RunRecord {
                fixture: "nginx".into(),
                run: "dry_run000000000".into(),
                outcome: RunOutcome::Failed {
                    error: "boom".into(),
                },
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["runs"][0]["outcome"]["status"], "failed");
        assert_eq!(json["runs"][0]["outcome"]["error"], "boom");
    }
}
