//! Refresh daemon: socket trigger endpoint, interval scheduler and a
//! single-slot run queue in front of the sync-and-rebuild pipeline.

mod error;
pub mod history;
pub mod launchd;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use history::{RunHistory, RunRecord};
pub use launchd::{generate_plist, install as install_launchd, uninstall as uninstall_launchd};
pub use protocol::{
    request_status, request_stop, request_trigger, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking};
