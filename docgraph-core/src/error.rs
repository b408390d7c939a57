use std::path::PathBuf;

use crate::types::{EdgeId, NodeId};

/// Top-level docgraph error type.
///
/// All fallible operations in `docgraph-core` return [`Result<T, DocGraphError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum DocGraphError {
    /// Error from the graph store layer (persistence, locking, integrity).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A write was rejected because its properties violate the schema.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Error during an analytics scan.
    #[error("Analysis error: {0}")]
    Analyze(#[from] AnalyzeError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the JSON-backed graph store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The persisted graph could not be read or is structurally invalid.
    /// The store never repairs it silently; the caller decides whether to reinitialize.
    #[error("Storage file {path} is corrupt: {reason}")]
    Corruption {
        /// Path of the graph file that failed to load.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The graph file was written by a newer, incompatible format version.
    #[error("Storage format version {found} is not supported (max major version {supported})")]
    UnsupportedVersion {
        /// Version string found in the file.
        found: String,
        /// Highest major version this build understands.
        supported: u32,
    },

    /// A write could not be committed; the mutation was not applied.
    #[error("Failed to commit write to {path}: {source}")]
    Write {
        /// Path of the graph file being written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Another store instance already holds the writer lock for this directory.
    #[error("Storage directory is locked by another writer: {path}")]
    LockContention {
        /// Path of the lock file.
        path: PathBuf,
    },

    /// A referenced node does not exist (edge endpoints, updates).
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A referenced edge does not exist.
    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// The store was opened read-only and cannot accept writes.
    #[error("Store is opened read-only")]
    ReadOnly,

    /// Filesystem I/O failed outside of a commit (directory setup, reads).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization of the graph document failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Property schema violations detected at write time.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required property is absent.
    #[error("{kind} is missing required property `{field}`")]
    MissingField {
        /// Node or edge type being written.
        kind: String,
        /// Name of the missing property.
        field: String,
    },

    /// A known property has the wrong JSON type.
    #[error("{kind} property `{field}` must be {expected}")]
    InvalidType {
        /// Node or edge type being written.
        kind: String,
        /// Offending property.
        field: String,
        /// Human-readable description of the expected type.
        expected: &'static str,
    },

    /// An extra property was supplied without a namespace prefix.
    #[error("{kind} property `{field}` is unknown; extra properties must be namespaced (e.g. `ext.{field}`)")]
    UnknownProperty {
        /// Node or edge type being written.
        kind: String,
        /// Offending property.
        field: String,
    },

    /// A value is well-typed but semantically invalid (empty SSG name, etc.).
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Offending property or argument.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors during analytics aggregation.
#[derive(thiserror::Error, Debug)]
pub enum AnalyzeError {
    /// The scan exceeded its deadline; no partial aggregate is returned.
    #[error("Analytics scan `{operation}` exceeded its deadline")]
    Timeout {
        /// Name of the aborted operation.
        operation: &'static str,
    },

    /// The scan was cancelled by the caller; no partial aggregate is returned.
    #[error("Analytics scan `{operation}` was cancelled")]
    Cancelled {
        /// Name of the aborted operation.
        operation: &'static str,
    },

    /// Not enough data in the graph to run this analysis.
    #[error("Insufficient data for analysis: {0}")]
    InsufficientData(String),
}

/// Errors in docgraph configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, DocGraphError>`.
pub type Result<T> = std::result::Result<T, DocGraphError>;
