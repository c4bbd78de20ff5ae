//! External process execution.
//!
//! A [`ProcessRunner`] runs one command to completion and converts every
//! outcome (clean exit, non-zero exit, signal, spawn failure, timeout) into a
//! [`RunResult`]. The tool's stdout and stderr are forwarded line by line to
//! the log stream; nothing downstream parses them.
//!
//! Each tool runs in its own process group. When a stage times out, or its
//! output is still held open after the tool exited, the whole group is
//! killed so nothing a stage spawned outlives it.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use siterefresh_core::CommandSpec;

/// Number of trailing stderr lines kept for the failure message.
pub const STDERR_TAIL_LINES: usize = 40;

/// How long output readers may lag behind the tool's exit.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Short name used as a log field (the stage name).
    pub label: String,
    pub command: CommandSpec,
    pub working_dir: PathBuf,
    /// Complete child environment; see [`compose_environment`].
    pub environment: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub succeeded: bool,
    pub error_message: Option<String>,
}

impl RunResult {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error_message: Some(message.into()),
        }
    }
}

/// Runs an [`Invocation`], blocking until the process has exited.
pub trait ProcessRunner {
    fn run(&self, invocation: &Invocation) -> RunResult;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn run(&self, invocation: &Invocation) -> RunResult {
        (**self).run(invocation)
    }
}

/// Ambient variables overlaid with `overrides`; overrides win on collision.
pub fn compose_environment(
    ambient: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = ambient.clone();
    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// Each call drives the child on its own current-thread runtime, so it can be
/// used from plain threads and from `spawn_blocking`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> RunResult {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                return RunResult::failure(format!(
                    "failed to start process driver for `{}`: {err}",
                    invocation.command
                ));
            }
        };
        runtime.block_on(run_invocation(invocation))
    }
}

async fn run_invocation(invocation: &Invocation) -> RunResult {
    let mut command = Command::new(&invocation.command.program);
    command
        .args(&invocation.command.args)
        .current_dir(&invocation.working_dir)
        .env_clear()
        .envs(&invocation.environment)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            return RunResult::failure(format!(
                "failed to start `{}` in {}: {err}",
                invocation.command,
                invocation.working_dir.display()
            ));
        }
    };
    // The child leads its own group, so its pid is the group id.
    let group = child.id();

    let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    let mut pumps = Vec::new();
    if let Some(out) = child.stdout.take() {
        let label = invocation.label.clone();
        pumps.push(spawn_pump(out, move |line| {
            tracing::info!(target: "siterefresh::tool", stage = %label, "{line}");
        }));
    }
    if let Some(err) = child.stderr.take() {
        let label = invocation.label.clone();
        let tail = Arc::clone(&tail);
        pumps.push(spawn_pump(err, move |line| {
            tracing::warn!(target: "siterefresh::tool", stage = %label, "{line}");
            if let Ok(mut tail) = tail.lock() {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.to_string());
            }
        }));
    }

    let waited = wait_with_deadline(&mut child, group, invocation.timeout).await;
    drain_output(&mut pumps, group, &invocation.label).await;

    let stderr_tail = tail
        .lock()
        .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
        .unwrap_or_default();

    match waited {
        Ok(Waited::Exited(status)) if status.success() => RunResult::success(),
        Ok(Waited::Exited(status)) => RunResult::failure(with_tail(
            format!("Command failed: {} ({})", invocation.command, describe(status)),
            &stderr_tail,
        )),
        Ok(Waited::TimedOut(limit)) => RunResult::failure(with_tail(
            format!(
                "Command timed out after {}s and was killed: {}",
                limit.as_secs_f64(),
                invocation.command
            ),
            &stderr_tail,
        )),
        Err(err) => RunResult::failure(format!(
            "failed waiting for `{}`: {err}",
            invocation.command
        )),
    }
}

enum Waited {
    Exited(ExitStatus),
    TimedOut(Duration),
}

async fn wait_with_deadline(
    child: &mut Child,
    group: Option<u32>,
    timeout: Option<Duration>,
) -> io::Result<Waited> {
    let Some(limit) = timeout else {
        return child.wait().await.map(Waited::Exited);
    };

    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => status.map(Waited::Exited),
        Err(_) => {
            match group {
                Some(group) => kill_group(group),
                None => {
                    if let Err(err) = child.start_kill() {
                        tracing::warn!(error = %err, "failed to kill timed-out process");
                    }
                }
            }
            let _ = child.wait().await;
            Ok(Waited::TimedOut(limit))
        }
    }
}

/// Wait for the output readers to reach end of stream. Anything still holding
/// the pipes after the grace period belongs to the tool's group and is killed.
async fn drain_output(pumps: &mut Vec<JoinHandle<()>>, group: Option<u32>, label: &str) {
    if join_within(pumps, OUTPUT_DRAIN_GRACE).await {
        return;
    }
    tracing::warn!(stage = %label, "tool left processes holding its output open; killing them");
    if let Some(group) = group {
        kill_group(group);
    }
    if !join_within(pumps, OUTPUT_DRAIN_GRACE).await {
        for pump in pumps.drain(..) {
            pump.abort();
        }
    }
}

async fn join_within(pumps: &mut Vec<JoinHandle<()>>, grace: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + grace;
    while let Some(pump) = pumps.last_mut() {
        if tokio::time::timeout_at(deadline, pump).await.is_err() {
            return false;
        }
        pumps.pop();
    }
    true
}

fn kill_group(group: u32) {
    let Ok(pgid) = libc::pid_t::try_from(group) else {
        return;
    };
    // SAFETY: killpg only sends a signal and has no memory effects.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(error = %err, pgid, "failed to kill process group");
        }
    }
}

/// Forward every line of `stream` to `on_line` on a background task.
/// Invalid UTF-8 is replaced rather than dropped.
fn spawn_pump<S, F>(stream: S, mut on_line: F) -> JoinHandle<()>
where
    S: AsyncRead + Unpin + Send + 'static,
    F: FnMut(&str) + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    on_line(line.trim_end_matches(['\n', '\r']));
                }
                Err(err) => {
                    tracing::debug!(error = %err, "tool output stream closed");
                    break;
                }
            }
        }
    })
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => status.to_string(),
    }
}

fn with_tail(message: String, tail: &str) -> String {
    if tail.trim().is_empty() {
        message
    } else {
        format!("{message}\n{tail}")
    }
}
