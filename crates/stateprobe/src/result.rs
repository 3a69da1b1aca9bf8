//! Result and error types for Stateprobe.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Stateprobe operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur in Stateprobe
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Structural operation attempted before the fixture was copied
    #[error("Fixture '{fixture}' is not prepared: copy it before applying {operation}")]
    NotPrepared {
        /// Fixture name
        fixture: String,
        /// Operation that was attempted
        operation: String,
    },

    /// Expected run artifact (snapshot directory or log) is absent
    #[error("Missing run artifact: {}", path.display())]
    MissingArtifacts {
        /// Path that was expected to exist
        path: PathBuf,
    },

    /// Snapshot directory holds an unreadable or gapped sequence
    #[error("Corrupt snapshot sequence in {}: {message}", path.display())]
    CorruptSequence {
        /// Snapshot directory
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A mutated run was compared before its fixture had a baseline
    #[error("No baseline recorded for fixture '{fixture}'")]
    MissingBaseline {
        /// Fixture name
        fixture: String,
    },

    /// A second baseline was recorded for the same fixture
    #[error("Baseline for fixture '{fixture}' was already recorded")]
    DuplicateBaseline {
        /// Fixture name
        fixture: String,
    },

    /// Mutation name not present in the catalog
    #[error("Unknown mutation: {name}")]
    UnknownMutation {
        /// Requested name
        name: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl HarnessError {
    /// Create a not-prepared error
    #[must_use]
    pub fn not_prepared(fixture: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NotPrepared {
            fixture: fixture.into(),
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
