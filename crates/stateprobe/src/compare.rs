//! Differential comparison of a mutated run against its baseline.

use crate::result::{HarnessError, HarnessResult};
use crate::snapshot::{CaptureCategory, Snapshot, SnapshotSequence, SnapshotStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Execution log file inside a run directory.
pub const LOG_FILE: &str = "logs.txt";

/// Snapshot directory inside a run directory.
pub const SNAPSHOT_DIR: &str = "snapshots";

/// Whether a run is the unmodified reference or a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Unmodified fixture
    Baseline,
    /// Fixture after one mutation
    Mutated,
}

/// Artifacts of one executed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Fixture name
    pub fixture: String,
    /// Mutation id (with run suffix)
    pub mutation: String,
    /// Baseline or mutated
    pub kind: RunKind,
    /// Captured checkpoints
    pub snapshots: SnapshotSequence,
    /// Raw execution log
    pub log: String,
}

impl RunResult {
    /// Run result from in-memory artifacts
    #[must_use]
    pub fn new(
        fixture: impl Into<String>,
        mutation: impl Into<String>,
        kind: RunKind,
        snapshots: SnapshotSequence,
        log: impl Into<String>,
    ) -> Self {
        Self {
            fixture: fixture.into(),
            mutation: mutation.into(),
            kind,
            snapshots,
            log: log.into(),
        }
    }

    /// Load `logs.txt` and `snapshots/` from a run directory
    pub fn load(
        dir: &Path,
        fixture: impl Into<String>,
        mutation: impl Into<String>,
        kind: RunKind,
    ) -> HarnessResult<Self> {
        let log_path = dir.join(LOG_FILE);
        let log = match fs::read_to_string(&log_path) {
            Ok(log) => log,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HarnessError::MissingArtifacts { path: log_path });
            }
            Err(e) => return Err(e.into()),
        };
        let snapshots = SnapshotStore::new(dir.join(SNAPSHOT_DIR)).load_sequence()?;
        Ok(Self::new(fixture, mutation, kind, snapshots, log))
    }
}

/// State difference at one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    /// Checkpoint id
    pub checkpoint: u64,
    /// Baseline state
    pub baseline: Snapshot,
    /// Mutated state
    pub mutated: Snapshot,
    /// Categories that differ
    pub categories: Vec<CaptureCategory>,
}

/// Two runs recorded a different number of checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LengthMismatch {
    /// Baseline checkpoints
    pub baseline: usize,
    /// Mutated checkpoints
    pub mutated: usize,
}

impl LengthMismatch {
    /// Number of checkpoints actually compared
    #[must_use]
    pub fn compared(&self) -> usize {
        self.baseline.min(self.mutated)
    }
}

/// Classification of a mutated run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonOutcome {
    /// The mutated log lacks the success marker
    pub crashed: bool,
    /// At least one checkpoint differs
    pub diverged: bool,
    /// Per-checkpoint differences
    pub differences: Vec<Divergence>,
    /// Set when the sequences have different lengths
    pub length_mismatch: Option<LengthMismatch>,
}

impl ComparisonOutcome {
    /// Neither crashed nor diverged
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        !self.crashed && !self.diverged
    }
}

/// Compare `mutated` against `baseline`.
///
/// Only the common prefix of the two snapshot sequences is compared;
/// a length difference is reported, not treated as a failure.
#[must_use]
pub fn compare(baseline: &RunResult, mutated: &RunResult, success_marker: &str) -> ComparisonOutcome {
    let base_len = baseline.snapshots.len();
    let mut_len = mutated.snapshots.len();
    let length_mismatch = (base_len != mut_len).then(|| {
        tracing::warn!(
            fixture = %mutated.fixture,
            mutation = %mutated.mutation,
            baseline = base_len,
            mutated = mut_len,
            "different number of snapshots, comparing first {}",
            base_len.min(mut_len)
        );
        LengthMismatch {
            baseline: base_len,
            mutated: mut_len,
        }
    });

    let differences: Vec<Divergence> = baseline
        .snapshots
        .iter()
        .zip(mutated.snapshots.iter())
        .filter_map(|(b, m)| {
            let categories = b.differing_categories(m);
            (!categories.is_empty()).then(|| Divergence {
                checkpoint: b.checkpoint,
                baseline: b.clone(),
                mutated: m.clone(),
                categories,
            })
        })
        .collect();

    ComparisonOutcome {
        crashed: !mutated.log.contains(success_marker),
        diverged: !differences.is_empty(),
        differences,
        length_mismatch,
    }
}

/// Baseline run per fixture.
#[derive(Debug, Clone, Default)]
pub struct BaselineRegistry {
    baselines: BTreeMap<String, RunResult>,
}

impl BaselineRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the baseline of `run.fixture`
    pub fn record(&mut self, run: RunResult) -> HarnessResult<()> {
        if self.baselines.contains_key(&run.fixture) {
            return Err(HarnessError::DuplicateBaseline {
                fixture: run.fixture,
            });
        }
        let _ = self.baselines.insert(run.fixture.clone(), run);
        Ok(())
    }

    /// Baseline of `fixture`
    #[must_use]
    pub fn get(&self, fixture: &str) -> Option<&RunResult> {
        self.baselines.get(fixture)
    }

    /// Number of recorded baselines
    #[must_use]
    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    /// Whether no baseline is recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    /// Compare `mutated` against its fixture's baseline
    pub fn compare(&self, mutated: &RunResult, success_marker: &str) -> HarnessResult<ComparisonOutcome> {
        let baseline = self
            .get(&mutated.fixture)
            .ok_or_else(|| HarnessError::MissingBaseline {
                fixture: mutated.fixture.clone(),
            })?;
        Ok(compare(baseline, mutated, success_marker))
    }
}
