//! Error types for siterefresh-pipeline.

use std::path::PathBuf;

use thiserror::Error;

use siterefresh_core::ConfigError;

/// Faults raised outside the stages themselves. The orchestrator folds every
/// one of these into a failed outcome; none escape a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Run configuration could not be resolved.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another run holds the advisory lock.
    #[error("refresh run already in progress (lock {path} held by {holder})")]
    LockHeld { path: PathBuf, holder: String },
}

/// Convenience constructor for [`PipelineError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PipelineError {
    PipelineError::Io {
        path: path.into(),
        source,
    }
}
