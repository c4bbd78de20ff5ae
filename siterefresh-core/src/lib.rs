//! siterefresh core library: domain types, layered configuration, errors.
//!
//! Public API surface:
//! - [`types`]: stage, outcome and command value types
//! - [`config`]: [`PipelineConfig`] resolution from defaults, file, environment and overrides
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{ConfigFile, ConfigLayers, ConfigOverrides, EnvSnapshot, PipelineConfig};
pub use error::ConfigError;
pub use types::{
    BuildMode, CommandSpec, FailurePolicy, PipelineOutcome, StageName, StageResult, TriggerMarker,
};
