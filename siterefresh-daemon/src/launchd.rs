use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{io_err, DaemonError};
use crate::paths::{
    launch_agents_dir, launchd_plist_path, logs_dir, socket_path, DAEMON_LABEL, DAEMON_STDERR_LOG,
    DAEMON_STDOUT_LOG,
};

/// Render the launch agent plist that keeps `siterefresh daemon start` alive.
pub fn generate_plist(binary_path: &Path, log_dir: &Path, config: Option<&Path>) -> String {
    let stdout = log_dir.join(DAEMON_STDOUT_LOG).display().to_string();
    let stderr = log_dir.join(DAEMON_STDERR_LOG).display().to_string();

    let mut args = vec![
        binary_path.display().to_string(),
        "daemon".to_string(),
        "start".to_string(),
    ];
    if let Some(config) = config {
        args.push("--config".to_string());
        args.push(config.display().to_string());
    }
    let program_arguments: String = args
        .iter()
        .map(|arg| format!("    <string>{}</string>\n", xml_escape(arg)))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
{program_arguments}  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <true/>
  <key>StandardOutPath</key>
  <string>{stdout}</string>
  <key>StandardErrorPath</key>
  <string>{stderr}</string>
</dict>
</plist>
"#,
        label = DAEMON_LABEL,
        stdout = xml_escape(&stdout),
        stderr = xml_escape(&stderr),
    )
}

/// Write the launch agent for `binary_path` and bootstrap it for the current user.
pub fn install(
    home: &Path,
    binary_path: &Path,
    config: Option<&Path>,
) -> Result<PathBuf, DaemonError> {
    ensure_macos()?;

    for dir in [launch_agents_dir(home), logs_dir(home)] {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }

    let plist = launchd_plist_path(home);
    fs::write(&plist, generate_plist(binary_path, &logs_dir(home), config))
        .map_err(|e| io_err(&plist, e))?;

    let domain = launchctl_domain()?;
    let service = format!("{domain}/{DAEMON_LABEL}");

    // A previous install may still be loaded.
    let _ = launchctl(&["bootout", &service], true);
    launchctl(&["bootstrap", &domain, &plist.display().to_string()], false)?;
    launchctl(&["kickstart", "-k", &service], false)?;

    tracing::info!(plist = %plist.display(), "launch agent installed");
    Ok(plist)
}

/// Boot out the launch agent and remove its plist and socket.
pub fn uninstall(home: &Path) -> Result<(), DaemonError> {
    ensure_macos()?;

    let plist = launchd_plist_path(home);
    if plist.exists() {
        let service = format!("{}/{DAEMON_LABEL}", launchctl_domain()?);
        let _ = launchctl(&["bootout", &service], true);
        fs::remove_file(&plist).map_err(|e| io_err(&plist, e))?;
    }

    let socket = socket_path(home);
    if socket.exists() {
        let _ = fs::remove_file(socket);
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn ensure_macos() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn ensure_macos() -> Result<(), DaemonError> {
    Err(DaemonError::Launchd(
        "launchd management is only supported on macOS".to_string(),
    ))
}

fn launchctl(args: &[&str], ignore_failure: bool) -> Result<(), DaemonError> {
    let output = Command::new("launchctl")
        .args(args)
        .output()
        .map_err(|e| io_err("launchctl", e))?;

    if output.status.success() || ignore_failure {
        return Ok(());
    }

    Err(DaemonError::Launchd(format!(
        "launchctl {} failed (status {}): {} {}",
        args.first().copied().unwrap_or_default(),
        output.status,
        String::from_utf8_lossy(&output.stdout).trim(),
        String::from_utf8_lossy(&output.stderr).trim(),
    )))
}

fn launchctl_domain() -> Result<String, DaemonError> {
    let output = Command::new("id")
        .arg("-u")
        .output()
        .map_err(|e| io_err("id -u", e))?;
    let uid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || uid.is_empty() {
        return Err(DaemonError::Launchd(format!(
            "failed to resolve current uid (status {})",
            output.status
        )));
    }
    Ok(format!("gui/{uid}"))
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
