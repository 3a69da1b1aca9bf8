//! Mutation catalog for fixture robustness testing.
//!
//! Each mutation is a named, described transformation of a
//! [`FixtureHandle`]. Randomised mutations draw from an injected
//! [`TokenGenerator`], so a seed reproduces a run exactly.

use crate::fixture::FixtureHandle;
use crate::result::{HarnessError, HarnessResult};
use crate::snapshot::CaptureConfig;
use crate::token::TokenGenerator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Locales `change_language` picks from.
pub const LOCALES: [&str; 6] = [
    "fr_FR.UTF-8",
    "de_DE.UTF-8",
    "es_ES.UTF-8",
    "it_IT.UTF-8",
    "pt_PT.UTF-8",
    "ru_RU.UTF-8",
];

/// Environment variable `change_language` sets.
pub const LOCALE_VARIABLE: &str = "LC_ALL";

/// Token length bounds for `change_filenames`.
pub const FILENAME_TOKEN_LEN: (usize, usize) = (1, 20);

/// Token length bounds for `change_field`.
pub const FIELD_TOKEN_LEN: (usize, usize) = (1, 60);

/// Capture settings file written next to the hook.
///
/// JSON, so no dialect treats it as code.
pub const CAPTURE_SETTINGS_FILE: &str = "stateprobe-capture.json";

/// Layout of [`CAPTURE_SETTINGS_FILE`], readable as a harness configuration.
#[derive(Serialize)]
struct CaptureSettings<'a> {
    capture: &'a CaptureConfig,
}

/// Options of a configured mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOptions {
    /// Field names whose values are mutated
    #[serde(default)]
    pub keys: Vec<String>,
    /// Marker removed by `remove_remote_dir`
    #[serde(default)]
    pub marker: Option<String>,
}

/// A mutation as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationSpec {
    /// Catalog id
    pub name: String,
    /// Options, `null` allowed
    #[serde(default)]
    pub options: Option<MutationOptions>,
}

impl MutationSpec {
    /// Spec without options
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: None,
        }
    }

    /// Spec with field keys
    #[must_use]
    pub fn with_keys(name: impl Into<String>, keys: &[&str]) -> Self {
        Self {
            name: name.into(),
            options: Some(MutationOptions {
                keys: keys.iter().map(|k| (*k).to_string()).collect(),
                marker: None,
            }),
        }
    }
}

/// Outcome of applying one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationReport {
    /// Mutation id
    pub mutation: &'static str,
    /// Number of edits (insertions, rewritten files, renames)
    pub edits: usize,
}

/// A transformation of a fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Identity, used for the baseline run
    NoTransformation,
    /// Run under a different locale
    ChangeLanguage,
    /// Prefix filenames of the given fields with `./`
    PrependDotSlash {
        /// Field names
        keys: Vec<String>,
    },
    /// Rename files named by the given fields to random tokens
    ChangeFilenames {
        /// Field names
        keys: Vec<String>,
    },
    /// Replace values of the given fields with random tokens
    ChangeField {
        /// Field names
        keys: Vec<String>,
    },
    /// Run the unit twice
    Idempotency,
    /// Turn absolute remote paths into relative ones
    RemoveRemoteDir {
        /// Marker to delete; the dialect's default when `None`
        marker: Option<String>,
    },
    /// Run the unit without applying changes
    DryRun,
    /// Install the capture hook after the unit
    CaptureSnapshots {
        /// Hook executable copied into the fixture
        instrumentation: PathBuf,
        /// Arguments passed to the hook
        args: String,
        /// Capture settings handed to the hook
        settings: Option<CaptureConfig>,
    },
}

impl Mutation {
    /// Build a user-selected mutation from configuration
    pub fn from_spec(spec: &MutationSpec) -> HarnessResult<Self> {
        let options = spec.options.clone().unwrap_or_default();
        let keys = || -> HarnessResult<Vec<String>> {
            if options.keys.is_empty() {
                Err(HarnessError::config(format!(
                    "mutation '{}' requires options.keys",
                    spec.name
                )))
            } else {
                Ok(options.keys.clone())
            }
        };
        match spec.name.as_str() {
            "change_language" => Ok(Self::ChangeLanguage),
            "prepend_dotslash" => Ok(Self::PrependDotSlash { keys: keys()? }),
            "change_filenames" => Ok(Self::ChangeFilenames { keys: keys()? }),
            "change_field" => Ok(Self::ChangeField { keys: keys()? }),
            "idempotency" => Ok(Self::Idempotency),
            "remove_remote_dir" => Ok(Self::RemoveRemoteDir {
                marker: options.marker.clone(),
            }),
            "dry_run" => Ok(Self::DryRun),
            "no_transformation" => Err(HarnessError::config(
                "no_transformation is scheduled automatically as the baseline",
            )),
            "capture_snapshots" => Err(HarnessError::config(
                "capture_snapshots is always applied and cannot be selected",
            )),
            other => Err(HarnessError::UnknownMutation {
                name: other.to_string(),
            }),
        }
    }

    /// Capture hook mutation
    #[must_use]
    pub fn capture(instrumentation: impl Into<PathBuf>, args: impl Into<String>) -> Self {
        Self::CaptureSnapshots {
            instrumentation: instrumentation.into(),
            args: args.into(),
            settings: None,
        }
    }

    /// Capture hook mutation that also installs `settings` for the hook
    #[must_use]
    pub fn capture_with_settings(
        instrumentation: impl Into<PathBuf>,
        args: impl Into<String>,
        settings: CaptureConfig,
    ) -> Self {
        Self::CaptureSnapshots {
            instrumentation: instrumentation.into(),
            args: args.into(),
            settings: Some(settings),
        }
    }

    /// Catalog id
    #[must_use]
    pub const fn id(&self) -> &'static str {
        match self {
            Self::NoTransformation => "no_transformation",
            Self::ChangeLanguage => "change_language",
            Self::PrependDotSlash { .. } => "prepend_dotslash",
            Self::ChangeFilenames { .. } => "change_filenames",
            Self::ChangeField { .. } => "change_field",
            Self::Idempotency => "idempotency",
            Self::RemoveRemoteDir { .. } => "remove_remote_dir",
            Self::DryRun => "dry_run",
            Self::CaptureSnapshots { .. } => "capture_snapshots",
        }
    }

    /// Human-readable description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::NoTransformation => "No transformation",
            Self::ChangeLanguage => "Change the language of the executed environment",
            Self::PrependDotSlash { .. } => "Prepend './' to the filenames of options",
            Self::ChangeFilenames { .. } => {
                "Change the option's filename to a random unicode string, everywhere"
            }
            Self::ChangeField { .. } => {
                "Change the field's value to a random unicode string, everywhere"
            }
            Self::Idempotency => {
                "Duplicate all executions of the module's task to check idempotency"
            }
            Self::RemoveRemoteDir { .. } => "Create relative paths out of absolute paths",
            Self::DryRun => "Run the module's task in check/noop mode",
            Self::CaptureSnapshots { .. } => "Collect state after each unit test",
        }
    }

    /// Whether a sampling plan may draw this mutation more than once
    #[must_use]
    pub const fn repeatable(&self) -> bool {
        matches!(
            self,
            Self::ChangeLanguage | Self::ChangeFilenames { .. } | Self::ChangeField { .. }
        )
    }

    /// Apply the mutation to a materialised fixture
    pub fn apply(
        &self,
        fixture: &mut FixtureHandle,
        tokens: &mut TokenGenerator,
    ) -> HarnessResult<MutationReport> {
        let _ = fixture.root(self.id())?;
        let edits = match self {
            Self::NoTransformation => 0,
            Self::ChangeLanguage => {
                let locale = tokens.choose(&LOCALES).copied().unwrap_or(LOCALES[0]);
                fixture.set_environment_variable(LOCALE_VARIABLE, locale)?
            }
            Self::PrependDotSlash { keys } => {
                let mut edits = 0;
                for segment in final_segments(&fixture.field_values(keys)?) {
                    edits += fixture.rewrite_literal(&segment, &format!("./{segment}"))?;
                }
                edits
            }
            Self::ChangeFilenames { keys } => {
                let segments: Vec<String> = final_segments(&fixture.field_values(keys)?)
                    .into_iter()
                    .filter(|s| fixture.dialect().is_mutation_candidate(s))
                    .collect();
                let mut edits = 0;
                for segment in segments {
                    let token =
                        tokens.sanitized_token(FILENAME_TOKEN_LEN.0, FILENAME_TOKEN_LEN.1);
                    tracing::debug!(fixture = fixture.name(), %segment, %token, "renaming");
                    edits += fixture.rename_everywhere(&segment, &token)?;
                    edits += fixture.rewrite_literal(&segment, &token)?;
                }
                edits
            }
            Self::ChangeField { keys } => {
                let values: Vec<String> = fixture
                    .field_values(keys)?
                    .into_iter()
                    .filter(|v| fixture.dialect().is_mutation_candidate(v))
                    .collect();
                let mut edits = 0;
                for value in values {
                    let token = tokens.sanitized_token(FIELD_TOKEN_LEN.0, FIELD_TOKEN_LEN.1);
                    edits += fixture.rewrite_literal(&value, &token)?;
                }
                edits
            }
            Self::Idempotency => fixture.duplicate_unit()?,
            Self::RemoveRemoteDir { marker } => {
                let marker = marker
                    .clone()
                    .unwrap_or_else(|| fixture.dialect().remote_dir_marker().to_string());
                fixture.rewrite_literal(&marker, "")?
            }
            Self::DryRun => fixture.inject_dry_run()?,
            Self::CaptureSnapshots {
                instrumentation,
                args,
                settings,
            } => {
                let copy = fixture.add_auxiliary_file(instrumentation)?;
                let script = copy
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let settings_file = match settings {
                    Some(capture) => {
                        let contents = serde_json::to_string_pretty(&CaptureSettings { capture })?;
                        let _ = fixture.write_auxiliary_file(CAPTURE_SETTINGS_FILE, &contents)?;
                        Some(CAPTURE_SETTINGS_FILE)
                    }
                    None => None,
                };
                let content = fixture
                    .dialect()
                    .capture_invocation(&script, settings_file, args);
                fixture.insert_after_unit(&content)?
            }
        };
        tracing::info!(
            fixture = fixture.name(),
            instance = %fixture.instance_id(),
            mutation = self.id(),
            edits,
            "mutation applied"
        );
        Ok(MutationReport {
            mutation: self.id(),
            edits,
        })
    }
}

/// Distinct, non-empty final path segments of `values`
fn final_segments(values: &BTreeSet<String>) -> BTreeSet<String> {
    values
        .iter()
        .filter_map(|v| v.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Ordered list of mutations to run for one fixture.
///
/// The baseline always comes first; repeatable mutations are drawn
/// `repetitions` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPlan {
    entries: Vec<Mutation>,
}

impl MutationPlan {
    /// Build a plan from configured specs
    pub fn build(specs: &[MutationSpec], repetitions: usize) -> HarnessResult<Self> {
        let mut entries = vec![Mutation::NoTransformation];
        for spec in specs {
            let mutation = Mutation::from_spec(spec)?;
            let times = if mutation.repeatable() {
                repetitions.max(1)
            } else {
                1
            };
            entries.extend(std::iter::repeat(mutation).take(times));
        }
        Ok(Self { entries })
    }

    /// Planned mutations, baseline first
    #[must_use]
    pub fn entries(&self) -> &[Mutation] {
        &self.entries
    }

    /// Number of planned runs
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is planned
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First planned mutation with the given id
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Mutation> {
        self.entries.iter().find(|m| m.id() == id)
    }
}
