//! Error types for siterefresh-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while resolving a [`crate::PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading a config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A recognised option carried a value that could not be used.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    /// No working root was given and the current directory is unknown.
    #[error("cannot determine working root; set SITEREFRESH_ROOT or pass --root")]
    MissingRoot,

    /// The working root does not exist or is not a directory.
    #[error("working root {path} is not a directory")]
    RootNotDirectory { path: PathBuf },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.siterefresh/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.into(),
    }
}
