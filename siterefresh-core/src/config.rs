//! Layered run configuration.
//!
//! # Precedence
//!
//! ```text
//! built-in defaults  <  config file  <  environment snapshot  <  per-run overrides
//! ```
//!
//! The environment is read once into an [`EnvSnapshot`]; resolution never
//! touches process-wide state, so a resolved [`PipelineConfig`] is a plain
//! immutable value owned by one run.
//!
//! # API pattern
//!
//! As with the other `_at` helpers in this workspace, path-taking functions
//! accept an explicit `home` so tests can point them at a `TempDir`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{invalid, ConfigError};
use crate::types::{BuildMode, CommandSpec, TriggerMarker};

// ---------------------------------------------------------------------------
// 1. Defaults and recognised variables
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://estate-index.vercel.app/";
pub const DEFAULT_TRIGGER_HEADER: &str = "x-trigger";
pub const DEFAULT_TRIGGER_VALUE: &str = "true";
pub const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_SCHEDULE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

pub const LOCK_FILE_NAME: &str = ".siterefresh.lock";
pub const CONFIG_FILE_NAME: &str = "config.yaml";

pub const ENV_BASE_URL: &str = "BASE_URL";
pub const ENV_MODE: &str = "SITEREFRESH_MODE";
pub const ENV_ROOT: &str = "SITEREFRESH_ROOT";
pub const ENV_CONTENT_DIR: &str = "SITEREFRESH_CONTENT_DIR";
pub const ENV_SYNC_DIR: &str = "SITEREFRESH_SYNC_DIR";
pub const ENV_STAGE_TIMEOUT: &str = "SITEREFRESH_STAGE_TIMEOUT_SECS";
/// Exported to the tools; Hugo reads it to pick its environment.
pub const ENV_HUGO_ENV: &str = "HUGO_ENV";

/// Default sync command: build the feed tool, then run it against the
/// content directory handed over through the environment.
pub fn default_sync_command() -> CommandSpec {
    CommandSpec::new(
        "sh",
        [
            "-c",
            "go build -o xmlsync . && ./xmlsync -content \"$SITEREFRESH_CONTENT_DIR\"",
        ],
    )
}

pub fn default_build_command() -> CommandSpec {
    CommandSpec::new("npm", ["run", "build"])
}

// ---------------------------------------------------------------------------
// 2. Environment snapshot
// ---------------------------------------------------------------------------

/// Immutable copy of the ambient environment taken at run entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl EnvSnapshot {
    /// Snapshot the current process environment and working directory.
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self {
            vars,
            cwd: std::env::current_dir().ok(),
        }
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Non-empty value of `key`. Empty strings count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }
}

// ---------------------------------------------------------------------------
// 3. Config file
// ---------------------------------------------------------------------------

/// On-disk YAML configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BuildMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_tool_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_command: Option<CommandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<CommandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_stale_after_secs: Option<u64>,
    /// Daemon scheduler period; `0` disables scheduled runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_interval_secs: Option<u64>,
}

impl ConfigFile {
    /// Load a config file. Returns [`ConfigError::Io`] if it cannot be read
    /// and [`ConfigError::Parse`] (with path) if the YAML is malformed.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`ConfigFile::load_at`] but a missing file yields the empty config.
    pub fn load_or_default_at(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_at(path)
    }

    /// Scheduler period. Defaults to six hours; `0` disables scheduling.
    pub fn schedule_interval(&self) -> Option<Duration> {
        match self.schedule_interval_secs {
            None => Some(DEFAULT_SCHEDULE_INTERVAL),
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        }
    }

    /// The configured trusted marker, or the default. Both parts must be
    /// non-empty.
    pub fn trigger_marker(&self) -> Result<TriggerMarker, ConfigError> {
        let marker = self.trigger.clone().unwrap_or_else(default_trigger_marker);
        if marker.header.is_empty() || marker.value.is_empty() {
            return Err(invalid("trigger", "header and value must both be non-empty"));
        }
        Ok(marker)
    }
}

/// `<home>/.siterefresh/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".siterefresh").join(CONFIG_FILE_NAME)
}

/// `config_path_at` convenience wrapper using `dirs::home_dir()`.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    Ok(config_path_at(&home))
}

// ---------------------------------------------------------------------------
// 4. Per-run overrides
// ---------------------------------------------------------------------------

/// Options a single invocation may override. Travels over the daemon socket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BuildMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_tool_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// 5. Layers for one run
// ---------------------------------------------------------------------------

/// Everything a run resolves its configuration from, captured at entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayers {
    pub file: ConfigFile,
    pub env: EnvSnapshot,
    pub overrides: ConfigOverrides,
}

impl ConfigLayers {
    pub fn new(file: ConfigFile, env: EnvSnapshot, overrides: ConfigOverrides) -> Self {
        Self {
            file,
            env,
            overrides,
        }
    }

    /// The marker triggers are checked against. Known before the rest of the
    /// configuration is resolved.
    pub fn trigger_marker(&self) -> Result<TriggerMarker, ConfigError> {
        self.file.trigger_marker()
    }

    pub fn resolve(&self) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig::resolve(&self.file, &self.env, &self.overrides)
    }
}

pub fn default_trigger_marker() -> TriggerMarker {
    TriggerMarker {
        header: DEFAULT_TRIGGER_HEADER.to_string(),
        value: DEFAULT_TRIGGER_VALUE.to_string(),
    }
}

// ---------------------------------------------------------------------------
// 6. Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub base_url: String,
    pub mode: BuildMode,
    pub working_root: PathBuf,
    pub content_dir: PathBuf,
    pub sync_tool_dir: PathBuf,
    pub sync_command: CommandSpec,
    pub build_command: CommandSpec,
    #[serde(serialize_with = "serialize_opt_secs")]
    pub stage_timeout: Option<Duration>,
    pub trigger: TriggerMarker,
    #[serde(serialize_with = "serialize_secs")]
    pub lock_stale_after: Duration,
}

impl PipelineConfig {
    /// Resolve a configuration from its layers.
    ///
    /// Relative `content_dir` / `sync_tool_dir` are taken relative to the
    /// working root; a relative working root is taken relative to the
    /// snapshot's current directory.
    pub fn resolve(
        file: &ConfigFile,
        env: &EnvSnapshot,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let base_url = overrides
            .base_url
            .clone()
            .or_else(|| env.get(ENV_BASE_URL).map(str::to_owned))
            .or_else(|| file.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        validate_base_url(&base_url)?;

        let mode = match (overrides.mode, env.get(ENV_MODE)) {
            (Some(mode), _) => mode,
            (None, Some(raw)) => raw.parse().map_err(|reason| invalid(ENV_MODE, reason))?,
            (None, None) => file.mode.unwrap_or_default(),
        };

        let working_root = overrides
            .working_root
            .clone()
            .or_else(|| env.get(ENV_ROOT).map(PathBuf::from))
            .or_else(|| file.working_root.clone());
        let working_root = match (working_root, env.cwd()) {
            (Some(root), _) if root.is_absolute() => root,
            (Some(root), Some(cwd)) => cwd.join(root),
            (Some(root), None) => root,
            (None, Some(cwd)) => cwd.to_path_buf(),
            (None, None) => return Err(ConfigError::MissingRoot),
        };
        if !working_root.is_dir() {
            return Err(ConfigError::RootNotDirectory { path: working_root });
        }

        let content_dir = overrides
            .content_dir
            .clone()
            .or_else(|| env.get(ENV_CONTENT_DIR).map(PathBuf::from))
            .or_else(|| file.content_dir.clone())
            .map(|dir| working_root.join(dir))
            .unwrap_or_else(|| working_root.join("content").join("listings"));

        let sync_tool_dir = overrides
            .sync_tool_dir
            .clone()
            .or_else(|| env.get(ENV_SYNC_DIR).map(PathBuf::from))
            .or_else(|| file.sync_tool_dir.clone())
            .map(|dir| working_root.join(dir))
            .unwrap_or_else(|| working_root.join("cmd").join("xmlsync"));

        let timeout_secs = match (overrides.stage_timeout_secs, env.get(ENV_STAGE_TIMEOUT)) {
            (Some(secs), _) => Some(secs),
            (None, Some(raw)) => Some(raw.trim().parse::<u64>().map_err(|err| {
                invalid(ENV_STAGE_TIMEOUT, format!("'{raw}' is not a number of seconds: {err}"))
            })?),
            (None, None) => file.stage_timeout_secs,
        };
        let stage_timeout = timeout_secs.filter(|s| *s > 0).map(Duration::from_secs);

        let trigger = file.trigger_marker()?;

        Ok(Self {
            base_url,
            mode,
            working_root,
            content_dir,
            sync_tool_dir,
            sync_command: file.sync_command.clone().unwrap_or_else(default_sync_command),
            build_command: file
                .build_command
                .clone()
                .unwrap_or_else(default_build_command),
            stage_timeout,
            trigger,
            lock_stale_after: file
                .lock_stale_after_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_LOCK_STALE_AFTER),
        })
    }

    /// `<working_root>/.siterefresh.lock`
    pub fn lock_path(&self) -> PathBuf {
        self.working_root.join(LOCK_FILE_NAME)
    }

    /// Variables layered over the ambient environment for both tools.
    pub fn tool_environment(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ENV_BASE_URL.to_string(), self.base_url.clone()),
            (ENV_HUGO_ENV.to_string(), self.mode.to_string()),
            (
                ENV_CONTENT_DIR.to_string(),
                self.content_dir.display().to_string(),
            ),
        ])
    }
}

fn validate_base_url(url: &str) -> Result<(), ConfigError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| invalid(ENV_BASE_URL, format!("'{url}' must start with http:// or https://")))?;
    if rest.split('/').next().unwrap_or_default().is_empty() {
        return Err(invalid(ENV_BASE_URL, format!("'{url}' has no host")));
    }
    Ok(())
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

fn serialize_opt_secs<S: serde::Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs()),
        None => s.serialize_none(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env_in(root: &Path) -> EnvSnapshot {
        EnvSnapshot::from_vars(Vec::<(String, String)>::new()).with_cwd(root)
    }

    #[test]
    fn defaults_follow_working_root() {
        let root = TempDir::new().unwrap();
        let cfg = PipelineConfig::resolve(
            &ConfigFile::default(),
            &env_in(root.path()),
            &ConfigOverrides::default(),
        )
        .unwrap();

        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.mode, BuildMode::Production);
        assert_eq!(cfg.working_root, root.path());
        assert_eq!(cfg.content_dir, root.path().join("content").join("listings"));
        assert_eq!(cfg.sync_tool_dir, root.path().join("cmd").join("xmlsync"));
        assert_eq!(cfg.build_command.to_string(), "npm run build");
        assert_eq!(cfg.stage_timeout, None);
        assert_eq!(cfg.trigger.header, "x-trigger");
        assert_eq!(cfg.lock_path(), root.path().join(LOCK_FILE_NAME));
    }

    #[test]
    fn empty_env_value_counts_as_unset() {
        let root = TempDir::new().unwrap();
        let env = EnvSnapshot::from_vars([(ENV_BASE_URL, "")]).with_cwd(root.path());
        let cfg =
            PipelineConfig::resolve(&ConfigFile::default(), &env, &ConfigOverrides::default())
                .unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn missing_root_without_cwd_is_an_error() {
        let env = EnvSnapshot::from_vars([("PATH", "/bin")]);
        let err =
            PipelineConfig::resolve(&ConfigFile::default(), &env, &ConfigOverrides::default())
                .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRoot), "got: {err}");
    }

    #[test]
    fn zero_timeout_disables_it() {
        let root = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            stage_timeout_secs: Some(0),
            ..Default::default()
        };
        let cfg = PipelineConfig::resolve(&ConfigFile::default(), &env_in(root.path()), &overrides)
            .unwrap();
        assert_eq!(cfg.stage_timeout, None);
    }

    #[test]
    fn tool_environment_exports_base_url_mode_and_content_dir() {
        let root = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            mode: Some(BuildMode::Staging),
            base_url: Some("https://example.test/sub/".to_string()),
            ..Default::default()
        };
        let cfg = PipelineConfig::resolve(&ConfigFile::default(), &env_in(root.path()), &overrides)
            .unwrap();
        let env = cfg.tool_environment();
        assert_eq!(env.get("BASE_URL").map(String::as_str), Some("https://example.test/sub/"));
        assert_eq!(env.get("HUGO_ENV").map(String::as_str), Some("staging"));
        assert_eq!(
            env.get(ENV_CONTENT_DIR).map(String::as_str),
            Some(cfg.content_dir.display().to_string().as_str())
        );
    }

    #[test]
    fn schedule_interval_zero_disables() {
        let file = ConfigFile {
            schedule_interval_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(file.schedule_interval(), None);
        assert_eq!(
            ConfigFile::default().schedule_interval(),
            Some(DEFAULT_SCHEDULE_INTERVAL)
        );
    }

    #[test]
    fn empty_marker_value_is_rejected_before_resolution() {
        let file = ConfigFile {
            trigger: Some(TriggerMarker {
                header: "x-vercel-cron".to_string(),
                value: String::new(),
            }),
            ..Default::default()
        };
        let err = file.trigger_marker().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "trigger", .. }), "got: {err}");

        let layers = ConfigLayers::new(file, EnvSnapshot::default(), ConfigOverrides::default());
        assert!(layers.trigger_marker().is_err());
        assert_eq!(
            ConfigFile::default().trigger_marker().unwrap(),
            default_trigger_marker()
        );
    }
}
