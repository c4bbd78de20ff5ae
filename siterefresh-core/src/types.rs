//! Domain types for a refresh run.
//!
//! Every value here is owned by exactly one run; nothing is shared between
//! concurrent invocations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The two stages of a refresh run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Sync,
    Build,
}

impl StageName {
    /// Caller-facing error label when this stage ends a run.
    pub fn failure_label(&self) -> &'static str {
        match self {
            StageName::Sync => "Sync failed",
            StageName::Build => "Build failed",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageName::Sync => write!(f, "sync"),
            StageName::Build => write!(f, "build"),
        }
    }
}

/// What a stage failure does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Failure is recorded and the next stage still runs.
    NonFatal,
    /// Failure terminates the run with a failure outcome.
    Fatal,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::NonFatal => write!(f, "non-fatal"),
            FailurePolicy::Fatal => write!(f, "fatal"),
        }
    }
}

/// Site build environment, exported to both tools as `HUGO_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Production,
    Staging,
    Development,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Production => write!(f, "production"),
            BuildMode::Staging => write!(f, "staging"),
            BuildMode::Development => write!(f, "development"),
        }
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            other => Err(format!(
                "unknown build mode '{other}'; expected: production, staging, development"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands and markers
// ---------------------------------------------------------------------------

/// An external command: program plus arguments, no shell interpretation.
///
/// Serialized as a plain list (`["npm", "run", "build"]`); the first element
/// is the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for CommandSpec {
    type Error = String;

    fn try_from(mut parts: Vec<String>) -> Result<Self, Self::Error> {
        if parts.is_empty() || parts[0].trim().is_empty() {
            return Err("command must name a program".to_string());
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }
}

impl From<CommandSpec> for Vec<String> {
    fn from(command: CommandSpec) -> Self {
        let mut parts = Vec::with_capacity(command.args.len() + 1);
        parts.push(command.program);
        parts.extend(command.args);
        parts
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// The header key/value pair a trigger must carry to be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMarker {
    pub header: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub policy: FailurePolicy,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

/// Terminal report of an authenticated run. Produced exactly once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub success: bool,
    pub message: String,
    pub duration_seconds: f64,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    /// Set when a fatal stage ended the run; `None` on success or on a fault
    /// outside the stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<StageName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageResult>,
}

impl PipelineOutcome {
    /// `"12.34s"`: two decimals, as reported to callers.
    pub fn duration_label(&self) -> String {
        format_duration(self.duration_seconds)
    }

    pub fn timestamp_label(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

/// Seconds rendered with two decimals and an `s` suffix.
pub fn format_duration(seconds: f64) -> String {
    format!("{seconds:.2}s")
}

/// ISO-8601 UTC with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
