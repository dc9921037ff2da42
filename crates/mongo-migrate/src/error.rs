//! Error types for the migration library.

use crate::pool::ItemFailure;
use crate::process::ProcessError;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status for any failed run.
pub const EXIT_FAILURE: u8 = 1;

/// Exit status after an interrupt signal (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

/// Which side of the migration an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Destination => write!(f, "destination"),
        }
    }
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Malformed connection string, empty required field, bad settings file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Liveness check failed for one side.
    #[error("Connection to {side} failed: {message}")]
    Connection { side: Side, message: String },

    /// Listing collections failed, or nothing is left after filtering.
    #[error("Failed to enumerate collections: {0}")]
    Enumeration(String),

    /// External tool failed to start or exited non-zero.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Dump artifact missing at restore time.
    #[error("Dump artifact for {item} not found at {}", .path.display())]
    ArtifactNotFound { item: String, path: PathBuf },

    /// The dump root does not contain a database directory.
    #[error("Invalid dump layout: {0}")]
    DumpLayout(String),

    /// One or more items failed during a phase.
    #[error("{phase} phase failed for {} of {total} collections", .failures.len())]
    Phase {
        phase: String,
        failures: Vec<ItemFailure>,
        total: usize,
    },

    /// Dropping the destination database failed.
    #[error("Failed to drop destination database: {0}")]
    Drop(String),

    /// The prompt collaborator failed (terminal gone, read error).
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Run aborted by an interrupt signal.
    #[error("Migration interrupted")]
    Interrupted,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error for the given side.
    pub fn connection(side: Side, message: impl Into<String>) -> Self {
        MigrateError::Connection {
            side,
            message: message.into(),
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Interrupted => EXIT_INTERRUPTED,
            _ => EXIT_FAILURE,
        }
    }

    /// Format error with full details including error chain and, for phase
    /// failures, every failed collection.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        if let MigrateError::Phase { failures, .. } = self {
            output.push_str("\nFailed collections:\n");
            for failure in failures {
                output.push_str(&format!(
                    "  - {} (worker {}): {}\n",
                    failure.item, failure.worker_id, failure.message
                ));
            }
        }

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Interrupted.exit_code(), 130);
        assert_eq!(MigrateError::Config("bad".into()).exit_code(), 1);
        assert_eq!(
            MigrateError::connection(Side::Source, "refused").exit_code(),
            1
        );
    }

    #[test]
    fn test_connection_error_names_side() {
        let err = MigrateError::connection(Side::Destination, "timed out");
        assert_eq!(err.to_string(), "Connection to destination failed: timed out");
    }

    #[test]
    fn test_phase_error_lists_failures() {
        let err = MigrateError::Phase {
            phase: "Dump".into(),
            failures: vec![ItemFailure {
                item: "orders".into(),
                message: "exit code 1".into(),
                worker_id: 2,
            }],
            total: 5,
        };
        assert_eq!(err.to_string(), "Dump phase failed for 1 of 5 collections");
        let detailed = err.format_detailed();
        assert!(detailed.contains("orders (worker 2): exit code 1"));
    }
}
