//! `siterefresh config`: show the configuration a run would use.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use siterefresh_core::{ConfigLayers, EnvSnapshot};

use super::{load_config_file, OverrideArgs};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Emit JSON instead of YAML.
    #[arg(long)]
    pub json: bool,

    /// Config file (defaults to ~/.siterefresh/config.yaml).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

impl ConfigArgs {
    pub fn run(self) -> Result<()> {
        let file = load_config_file(self.config.as_deref())?;
        let layers = ConfigLayers::new(file, EnvSnapshot::capture(), self.overrides.into_overrides());
        let resolved = layers.resolve().context("invalid configuration")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&resolved).context("failed to render config JSON")?
            );
        } else {
            print!(
                "{}",
                serde_yaml::to_string(&resolved).context("failed to render config YAML")?
            );
        }
        Ok(())
    }
}
