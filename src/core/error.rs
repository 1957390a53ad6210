//! Error types for the workspace atlas
//!
//! This module provides structured error handling using thiserror.
//! Fatal conditions travel as `Err` values up to the single abort point in
//! the CLI; nothing in the library panics on oracle inconsistencies.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Errors that can occur while building the package/module model
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The scope arguments cannot be used together
    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The build oracle could not be used at all
    #[error("Build oracle failed ({query}): {message}")]
    OracleFailure { query: String, message: String },

    /// Packages reported diagnostics; they have already been printed
    #[error("{count} package error(s) reported, exiting")]
    PackageErrors { count: usize },

    /// The oracle output broke an assumption the model relies on
    #[error("Internal invariant violated: {message}")]
    InvariantViolation { message: String },

    /// The toolchain VERSION marker could not be read
    #[error("Failed to read toolchain version marker {path}: {source}")]
    VersionMarker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// More than one module is being developed in place
    #[error("Ambiguous working module: {} unversioned modules ({})", paths.len(), paths.join(", "))]
    AmbiguousWorkingModule { paths: Vec<String> },

    /// A subprocess did not finish within its deadline
    #[error("Command `{command}` timed out after {timeout_secs}s")]
    CommandTimeout { command: String, timeout_secs: u64 },

    /// A subprocess could not be started or exited unsuccessfully
    #[error("Command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Raw syntax parsing failed
    #[error("Syntax error in {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    /// Git repository inspection failed
    #[cfg(feature = "git")]
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AnalyzerError>,
    },
}

impl AnalyzerError {
    /// Wrap an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AnalyzerError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an invariant violation error
    pub fn invariant(message: impl Into<String>) -> Self {
        AnalyzerError::InvariantViolation {
            message: message.into(),
        }
    }

    /// Create an invalid arguments error
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        AnalyzerError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        AnalyzerError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an oracle failure for the named query
    pub fn oracle(query: impl Into<String>, message: impl ToString) -> Self {
        AnalyzerError::OracleFailure {
            query: query.into(),
            message: message.to_string(),
        }
    }

    /// True for the internal-consistency kind, looking through context wrappers
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            AnalyzerError::InvariantViolation { .. } => true,
            AnalyzerError::WithContext { source, .. } => source.is_invariant_violation(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(ctx))
    }
}
