//! `siterefresh trigger`: hand a trigger to the running daemon.

use anyhow::{Context, Result};
use clap::Args;

use siterefresh_daemon::{request_trigger, DaemonError};

use super::{ensure_success, load_config_file, print_response, HeaderArgs, OverrideArgs};

#[derive(Args, Debug)]
pub struct TriggerArgs {
    #[command(flatten)]
    pub headers: HeaderArgs,

    /// Emit the response as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

impl TriggerArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        // The daemon checks against its own config; the local default file
        // names the marker to send when no -H is given.
        let marker = load_config_file(None)?
            .trigger_marker()
            .unwrap_or_else(|_| siterefresh_core::config::default_trigger_marker());
        let headers = self.headers.into_headers(&marker);

        let response = match request_trigger(&home, headers, self.overrides.into_overrides()) {
            Ok(response) => response,
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                return Err(err).context("start it with `siterefresh daemon start`");
            }
            Err(err) => return Err(err).context("daemon trigger failed"),
        };

        print_response(&response, self.json)?;
        ensure_success(&response)
    }
}
