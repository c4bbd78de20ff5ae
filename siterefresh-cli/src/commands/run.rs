//! `siterefresh run`: authenticate, sync and rebuild in this process.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use siterefresh_core::{config as core_config, ConfigLayers, EnvSnapshot, StageResult};
use siterefresh_pipeline::{Orchestrator, SystemRunner, TriggerRequest, TriggerResponse};

use super::{ensure_success, init_tracing, load_config_file, print_response, HeaderArgs, OverrideArgs};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub headers: HeaderArgs,

    /// Emit the response as JSON.
    #[arg(long)]
    pub json: bool,

    /// Config file (defaults to ~/.siterefresh/config.yaml).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Tabled)]
struct StageRow {
    #[tabled(rename = "stage")]
    stage: String,
    #[tabled(rename = "policy")]
    policy: String,
    #[tabled(rename = "result")]
    result: String,
    #[tabled(rename = "time")]
    time: String,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        init_tracing();

        let file = load_config_file(self.config.as_deref())?;
        let layers = ConfigLayers::new(file, EnvSnapshot::capture(), self.overrides.into_overrides());
        // A misconfigured marker is reported by the run itself as a 401.
        let marker = layers
            .trigger_marker()
            .unwrap_or_else(|_| core_config::default_trigger_marker());
        let request = TriggerRequest {
            headers: self.headers.into_headers(&marker),
            source: "cli".to_string(),
        };

        let outcome = Orchestrator::new(SystemRunner::new()).run(&request, &layers);
        let response = TriggerResponse::from_outcome(&outcome);

        if !self.json {
            if let Some(report) = outcome.outcome().filter(|r| !r.stages.is_empty()) {
                print_stages(&report.stages);
            }
        }
        print_response(&response, self.json)?;
        ensure_success(&response)
    }
}

fn print_stages(stages: &[StageResult]) {
    let rows: Vec<StageRow> = stages
        .iter()
        .map(|stage| StageRow {
            stage: stage.stage.to_string(),
            policy: stage.policy.to_string(),
            result: if stage.succeeded {
                "ok".green().to_string()
            } else {
                "failed".red().to_string()
            },
            time: format!("{:.2}s", stage.duration_ms as f64 / 1000.0),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
