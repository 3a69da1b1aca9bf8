//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Evaluated runs crashed, diverged or could not be evaluated
    #[error("{count} run(s) need attention")]
    Findings {
        /// Number of runs with findings
        count: usize,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stateprobe library error
    #[error("{0}")]
    Harness(#[from] stateprobe::HarnessError),
}

impl CliError {
    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_error() {
        let err = CliError::invalid_argument("bad arg");
        assert!(err.to_string().contains("Invalid argument"));
    }

    #[test]
    fn test_findings_error() {
        let err = CliError::Findings { count: 3 };
        assert_eq!(err.to_string(), "3 run(s) need attention");
    }

    #[test]
    fn test_from_harness_error() {
        let err: CliError = stateprobe::HarnessError::config("no fixtures").into();
        assert!(matches!(err, CliError::Harness(_)));
        assert!(err.to_string().contains("no fixtures"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CliError = io.into();
        assert!(err.to_string().contains("I/O error"));
    }
}
