//! Error types for fitflow
//!
//! Every fatal condition of the pipeline maps to one variant here. Soft
//! conditions (new variable, optional artifact absent, alias skip) are
//! logged through `tracing` and never surface as errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// fitflow error types
#[derive(Error, Debug)]
pub enum Error {
    /// Store file could not be opened in the requested mode
    #[error("Cannot open fit-result store {}: {reason}", path.display())]
    StoreOpen {
        /// Store file path
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// Write attempted through a read-only store handle
    #[error("Store {} was opened read-only\nReopen it with OpenMode::ReadWrite to commit fit results", .0.display())]
    ReadOnlyStore(PathBuf),

    /// Stored record lacks a field required by a strict read
    #[error("Corrupt record '{key}': missing required field '{field}'")]
    RecordCorrupt {
        /// Store key of the record
        key: String,
        /// Missing attribute name
        field: String,
    },

    /// Strict read of a key the store does not hold
    #[error("No record '{0}' in store\nFluctuation requires a prior fit result for every parameter")]
    RecordMissing(String),

    /// Live parameter cannot be serialized
    #[error("Parameter '{name}' cannot be stored: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Why serialization was refused
        reason: String,
    },

    /// Stage could not find a required artifact in the source manager
    #[error("Stage '{stage}' requires source '{key}', which no earlier stage published")]
    MissingDependency {
        /// Name of the stage that failed
        stage: String,
        /// Missing source key
        key: String,
    },

    /// Stage configuration is missing or has a malformed key
    #[error("Config error in stage '{stage}': key '{key}' {reason}")]
    Config {
        /// Stage name
        stage: String,
        /// Configuration key
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// Service lookup failed
    #[error("No service labelled '{0}' is registered")]
    MissingService(String),

    /// Alias or selection pattern failed to compile
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Pattern source text
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// Process lifecycle call made in the wrong state
    #[error("Invalid process state: expected {expected}, found {found}")]
    InvalidState {
        /// State the call requires
        expected: String,
        /// State the process is in
        found: String,
    },

    /// Fit engine reported a hard failure
    #[error("Fit step '{step}' of stage '{stage}' failed with status {status}")]
    Fit {
        /// Stage name
        stage: String,
        /// Fit step (migrad, hesse, minos)
        step: String,
        /// Engine status code
        status: i32,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Config`] error.
    pub fn config(stage: impl Into<String>, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            stage: stage.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Error::StoreOpen`] error.
    pub fn store_open(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::StoreOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Stage name carried by the error, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::MissingDependency { stage, .. }
            | Self::Config { stage, .. }
            | Self::Fit { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
