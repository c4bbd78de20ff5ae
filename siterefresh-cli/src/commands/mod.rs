//! Subcommands plus the argument groups and output helpers they share.

pub mod config;
pub mod daemon;
pub mod history;
pub mod run;
pub mod trigger;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use siterefresh_core::{config as core_config, BuildMode, ConfigFile, ConfigOverrides, TriggerMarker};
use siterefresh_pipeline::{ResponseBody, TriggerResponse};

/// Per-invocation configuration overrides; these beat the config file and
/// the environment.
#[derive(Args, Debug, Default, Clone)]
pub struct OverrideArgs {
    /// Site working root (defaults to $SITEREFRESH_ROOT, then the current directory).
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Public base URL exported to both tools as BASE_URL.
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Build mode exported as HUGO_ENV: production, staging, development.
    #[arg(long)]
    pub mode: Option<BuildMode>,

    /// Directory the sync tool writes listing content into.
    #[arg(long, value_name = "DIR")]
    pub content_dir: Option<PathBuf>,

    /// Directory containing the sync tool sources.
    #[arg(long, value_name = "DIR")]
    pub sync_dir: Option<PathBuf>,

    /// Kill a stage after this many seconds (0 disables).
    #[arg(long, value_name = "SECS")]
    pub stage_timeout: Option<u64>,
}

impl OverrideArgs {
    pub fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url,
            mode: self.mode,
            working_root: self.root,
            content_dir: self.content_dir,
            sync_tool_dir: self.sync_dir,
            stage_timeout_secs: self.stage_timeout,
        }
    }
}

/// Trigger headers supplied on the command line.
#[derive(Args, Debug, Default, Clone)]
pub struct HeaderArgs {
    /// Trigger header as KEY=VALUE; repeatable. Without any, the configured
    /// trusted marker is sent.
    #[arg(short = 'H', long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

impl HeaderArgs {
    pub fn into_headers(self, marker: &TriggerMarker) -> BTreeMap<String, String> {
        if self.headers.is_empty() {
            return BTreeMap::from([(marker.header.clone(), marker.value.clone())]);
        }
        self.headers.into_iter().collect()
    }
}

fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid header '{raw}': expected KEY=VALUE"))?;
    if key.is_empty() {
        return Err(format!("invalid header '{raw}': empty key"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Load `path`, or the default config file when `None`. A missing default
/// file is the empty config; a missing explicit file is an error.
pub fn load_config_file(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(path) => ConfigFile::load_at(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => {
            let path = core_config::config_path().context("could not locate config file")?;
            ConfigFile::load_or_default_at(&path)
                .with_context(|| format!("failed to load config {}", path.display()))
        }
    }
}

pub fn print_response(response: &TriggerResponse, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(response).context("failed to render response JSON")?
        );
        return Ok(());
    }

    match &response.body {
        ResponseBody::Success { message, .. } => {
            println!("{} {}", "✓".green().bold(), message);
        }
        ResponseBody::Failure {
            error,
            details,
            timestamp,
        } => {
            println!("{} {}", "✗".red().bold(), error.bold());
            if let Some(timestamp) = timestamp {
                println!("  at {timestamp}");
            }
            for line in details.lines() {
                println!("  {}", line.bright_black());
            }
        }
        ResponseBody::Unauthorized { error } => {
            println!("{} {} (status {})", "✗".yellow().bold(), error, response.status.code());
        }
    }
    Ok(())
}

/// Turn a non-200 response into a non-zero exit.
pub fn ensure_success(response: &TriggerResponse) -> Result<()> {
    if !response.is_success() {
        bail!("refresh did not succeed (status {})", response.status.code());
    }
    Ok(())
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
