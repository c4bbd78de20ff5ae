//! `siterefresh history`: recent daemon runs, newest first.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use siterefresh_daemon::{request_status, DaemonError, RunRecord};
use siterefresh_pipeline::RunState;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "finished")]
    finished: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "status")]
    status: u16,
    #[tabled(rename = "duration")]
    duration: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl HistoryArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let status = match request_status(&home) {
            Ok(status) => status,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running; no run history available");
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        let mut records: Vec<RunRecord> =
            serde_json::from_value(status["history"].clone()).context("malformed run history")?;
        records.reverse();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&records).context("failed to render history JSON")?
            );
            return Ok(());
        }

        if records.is_empty() {
            println!("No runs recorded since the daemon started.");
            return Ok(());
        }

        let rows: Vec<HistoryRow> = records.into_iter().map(history_row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn history_row(record: RunRecord) -> HistoryRow {
    HistoryRow {
        finished: record
            .finished_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        source: record.source,
        state: state_label(record.state),
        status: record.status,
        duration: record
            .duration_seconds
            .map(|secs| format!("{secs:.2}s"))
            .unwrap_or_else(|| "-".to_string()),
        detail: record
            .error
            .or(record.message)
            .map(|detail| first_line(&detail))
            .unwrap_or_default(),
    }
}

fn state_label(state: RunState) -> String {
    match state {
        RunState::Succeeded => "succeeded".green().to_string(),
        RunState::Denied => "denied".yellow().to_string(),
        RunState::Failed => "failed".red().to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}

fn first_line(text: &str) -> String {
    const MAX: usize = 60;
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX - 1).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_first_line_truncated() {
        assert_eq!(first_line("Command failed: npm run build\nstack"), "Command failed: npm run build");
        let long = "x".repeat(100);
        assert_eq!(first_line(&long).chars().count(), 60);
    }

    #[test]
    fn denied_run_row_has_no_duration() {
        let record = RunRecord {
            source: "socket".to_string(),
            state: RunState::Denied,
            status: 401,
            finished_at: chrono::Utc::now(),
            duration_seconds: None,
            message: None,
            error: None,
        };
        let row = history_row(record);
        assert_eq!(row.duration, "-");
        assert_eq!(row.status, 401);
        assert!(row.detail.is_empty());
    }
}
