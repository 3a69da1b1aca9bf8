//! Harness configuration loaded from YAML.

use crate::dialect::DialectKind;
use crate::fixture::FixtureHandle;
use crate::mutation::{MutationPlan, MutationSpec};
use crate::result::{HarnessError, HarnessResult};
use crate::snapshot::CaptureConfig;
use crate::token::Seed;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default seed when the configuration sets none.
pub const DEFAULT_SEED: u64 = 12345;

fn default_seed() -> u64 {
    DEFAULT_SEED
}

const fn default_repetitions() -> usize {
    1
}

/// One fixture under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// Fixture name, also the output directory name
    pub name: String,
    /// Document dialect
    #[serde(rename = "type")]
    pub kind: DialectKind,
    /// Canonical source tree
    pub path: PathBuf,
    /// Unit under test, the fixture name when absent
    #[serde(default)]
    pub unit: Option<String>,
    /// Location of the fixture inside the execution environment
    #[serde(default)]
    pub remote_path: Option<String>,
    /// Fixture-specific mutations
    #[serde(default)]
    pub mutations: Vec<MutationSpec>,
}

impl FixtureConfig {
    /// Fixture entry with no mutations of its own
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DialectKind, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            path: path.into(),
            unit: None,
            remote_path: None,
            mutations: Vec::new(),
        }
    }

    /// Add a fixture-specific mutation
    #[must_use]
    pub fn with_mutation(mut self, spec: MutationSpec) -> Self {
        self.mutations.push(spec);
        self
    }

    /// Unmaterialised handle for this fixture
    #[must_use]
    pub fn handle(&self) -> FixtureHandle {
        let mut handle = FixtureHandle::new(&self.name, self.kind, &self.path);
        if let Some(unit) = &self.unit {
            handle = handle.with_unit(unit);
        }
        if let Some(remote_path) = &self.remote_path {
            handle = handle.with_remote_path(remote_path);
        }
        handle
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Seed for the token generator
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Draws per repeatable mutation
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,
    /// Mutations applied to every fixture
    #[serde(default)]
    pub general_mutations: Vec<MutationSpec>,
    /// Fixtures under test
    #[serde(default)]
    pub fixtures: Vec<FixtureConfig>,
    /// Snapshot capture settings
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            repetitions: default_repetitions(),
            general_mutations: Vec::new(),
            fixtures: Vec::new(),
            capture: CaptureConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Parse YAML text
    pub fn from_yaml(text: &str) -> HarnessResult<Self> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file; relative fixture paths resolve against its directory
    pub fn load(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            HarnessError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for fixture in &mut config.fixtures {
            if fixture.path.is_relative() {
                let configured = fixture.path.display().to_string();
                let _ = fixture
                    .remote_path
                    .get_or_insert_with(|| format!("/{}", configured.trim_start_matches('/')));
                fixture.path = base.join(&fixture.path);
            }
        }
        tracing::debug!(
            path = %path.display(),
            fixtures = config.fixtures.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Reject duplicate fixture names and unknown mutations
    pub fn validate(&self) -> HarnessResult<()> {
        let mut seen = BTreeSet::new();
        for fixture in &self.fixtures {
            if !seen.insert(fixture.name.as_str()) {
                return Err(HarnessError::config(format!(
                    "fixture '{}' is declared twice",
                    fixture.name
                )));
            }
            let _ = self.plan_for(fixture)?;
        }
        Ok(())
    }

    /// Set the seed
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set repetitions of repeatable mutations
    #[must_use]
    pub const fn with_repetitions(mut self, repetitions: usize) -> Self {
        self.repetitions = repetitions;
        self
    }

    /// Add a mutation applied to every fixture
    #[must_use]
    pub fn with_general_mutation(mut self, spec: MutationSpec) -> Self {
        self.general_mutations.push(spec);
        self
    }

    /// Add a fixture
    #[must_use]
    pub fn with_fixture(mut self, fixture: FixtureConfig) -> Self {
        self.fixtures.push(fixture);
        self
    }

    /// Seed as a token generator seed
    #[must_use]
    pub const fn token_seed(&self) -> Seed {
        Seed::from_u64(self.seed)
    }

    /// Fixture named `name`
    pub fn fixture(&self, name: &str) -> HarnessResult<&FixtureConfig> {
        self.fixtures
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| HarnessError::config(format!("no fixture named '{name}'")))
    }

    /// Mutation plan of `fixture`: baseline, general mutations, then its own
    pub fn plan_for(&self, fixture: &FixtureConfig) -> HarnessResult<MutationPlan> {
        let specs: Vec<MutationSpec> = self
            .general_mutations
            .iter()
            .chain(&fixture.mutations)
            .cloned()
            .collect();
        MutationPlan::build(&specs, self.repetitions)
    }
}
