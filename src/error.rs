//! Crate-wide error type.
//!
//! Follows the same shape the rest of the ecosystem uses: a single
//! `thiserror` enum with `io`/`msg` convenience constructors, plus a
//! `Result` alias so call sites read `Result<T>` rather than
//! `std::result::Result<T, Error>`.

use std::{fmt, path::Path};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while reading/writing driver state or
/// scheduling a build. Variant names mirror the error kinds named in
/// the component design, not internal type names.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] DriverIoError),

    #[error("failed to deserialize: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to deserialize build record: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A per-file dependency artifact or build record could not be parsed.
    /// Reported as a diagnostic; the input is scheduled conservatively.
    #[error("unreadable artifact {path}: {reason}")]
    UnreadableArtifact { path: String, reason: String },

    /// Build record args/version/input-set mismatch. Disables incremental
    /// mode for this invocation; not fatal.
    #[error("incremental state invalidated: {0}")]
    SchemaMismatch(String),

    /// A `ModuleGraph::verify()` invariant failed. Indicates an
    /// implementation bug; fatal.
    #[error("graph invariant violated: {0}")]
    GraphInvariantViolation(String),

    /// Spawning the compile subprocess failed outright. Fatal for the
    /// whole build.
    #[error("failed to spawn job {job}: {reason}")]
    SubprocessSpawnFailure { job: String, reason: String },

    #[error("dependency key {0:?} violates the name/context population invariant for its kind")]
    BadDependencyKey(String),
}

impl Error {
    pub fn msg(msg: impl fmt::Display) -> Self {
        Error::Message(msg.to_string())
    }

    pub fn io(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Error::Io(DriverIoError::new(source, path))
    }
}

/// An I/O error annotated with the path that caused it, so diagnostics
/// don't degrade to bare `No such file or directory`.
#[derive(Debug, thiserror::Error)]
#[error("{io}: {path}")]
pub struct DriverIoError {
    io: std::io::Error,
    path: String,
}

impl DriverIoError {
    pub fn new(io: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self { io, path: path.as_ref().display().to_string() }
    }

    pub fn source(&self) -> &std::io::Error {
        &self.io
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
