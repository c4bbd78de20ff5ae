use std::path::{Path, PathBuf};

pub const DAEMON_LABEL: &str = "dev.siterefresh.daemon";

/// One run in flight plus at most this many waiting.
pub const RUN_QUEUE_DEPTH: usize = 1;
/// Completed runs kept for `status`.
pub const HISTORY_LIMIT: usize = 20;

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";
pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn siterefresh_root(home: &Path) -> PathBuf {
    home.join(".siterefresh")
}

pub fn socket_path(home: &Path) -> PathBuf {
    siterefresh_root(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    siterefresh_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}

pub fn launch_agents_dir(home: &Path) -> PathBuf {
    home.join("Library").join("LaunchAgents")
}

pub fn launchd_plist_path(home: &Path) -> PathBuf {
    launch_agents_dir(home).join(format!("{DAEMON_LABEL}.plist"))
}
