use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::MissedTickBehavior;

use siterefresh_core::{config, ConfigFile, ConfigLayers, ConfigOverrides, EnvSnapshot, TriggerMarker};
use siterefresh_pipeline::{
    AuthDecision, Orchestrator, RunOutcome, SystemRunner, TriggerAuthenticator, TriggerRequest,
    TriggerResponse,
};

use crate::error::{io_err, DaemonError};
use crate::history::{RunHistory, RunRecord};
use crate::log_rotation::{rotate_daemon_logs, RotationPolicy};
use crate::paths::{logs_dir, siterefresh_root, socket_path, DAEMON_LABEL, RUN_QUEUE_DEPTH};
use crate::protocol::{DaemonRequest, DaemonResponse};

const LOG_ROTATION_PERIOD: Duration = Duration::from_secs(5);

struct RunJob {
    request: TriggerRequest,
    overrides: ConfigOverrides,
    respond_to: oneshot::Sender<TriggerResponse>,
}

#[derive(Debug, Default)]
struct DaemonState {
    history: RunHistory,
    /// Source of the run currently executing.
    in_flight: Option<String>,
}

type SharedState = Arc<RwLock<DaemonState>>;

/// What every socket client needs to answer a request.
#[derive(Clone)]
struct ClientContext {
    home: PathBuf,
    file: Arc<ConfigFile>,
    marker: TriggerMarker,
    state: SharedState,
    run_tx: mpsc::Sender<RunJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

/// Load the config file, start the daemon runtime, and block until it exits.
pub fn start_blocking(home: &Path, config_file: Option<&Path>) -> Result<(), DaemonError> {
    init_tracing();
    let path = config_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config::config_path_at(home));
    let file = ConfigFile::load_or_default_at(&path)?;
    tracing::info!(config = %path.display(), "loaded daemon configuration");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), file))
}

/// Run the daemon: socket server, run processor, scheduler, log rotation and
/// signal handling, until `stop` or ctrl-c.
pub async fn run(home: PathBuf, file: ConfigFile) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let marker = file.trigger_marker()?;
    let file = Arc::new(file);
    let state: SharedState = Arc::new(RwLock::new(DaemonState::default()));
    let started_at_unix = unix_seconds_now();

    let (run_tx, run_rx) = mpsc::channel::<RunJob>(RUN_QUEUE_DEPTH);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let file = file.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = run_processor_task(file, state, run_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let interval = file.schedule_interval();
        let marker = marker.clone();
        let run_tx = run_tx.clone();
        tokio::spawn(async move {
            let result = scheduler_task(interval, marker, run_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let ctx = ClientContext {
            home: home.clone(),
            file: file.clone(),
            marker,
            state: state.clone(),
            run_tx,
            shutdown_tx: shutdown.clone(),
            started_at_unix,
        };
        tokio::spawn(async move {
            let result = socket_server_task(ctx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    tracing::info!(
        socket = %socket_path(&home).display(),
        schedule_secs = file.schedule_interval().map(|d| d.as_secs()),
        "daemon started",
    );

    let (processor_result, scheduler_result, socket_result, rotation_result, signal_result) = tokio::join!(
        processor_handle,
        scheduler_handle,
        socket_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("run_processor", processor_result)?;
    handle_join("scheduler", scheduler_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn run_processor_task(
    file: Arc<ConfigFile>,
    state: SharedState,
    mut run_rx: mpsc::Receiver<RunJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = run_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let source = job.request.source.clone();
                state.write().await.in_flight = Some(source.clone());

                // Environment is read once per run, at run start.
                let layers = ConfigLayers::new((*file).clone(), EnvSnapshot::capture(), job.overrides);
                let request = job.request;
                let outcome = tokio::task::spawn_blocking(move || {
                    Orchestrator::new(SystemRunner::new()).run(&request, &layers)
                })
                .await
                .map_err(|err| DaemonError::Protocol(format!("refresh task join error: {err}")))?;

                let response = TriggerResponse::from_outcome(&outcome);
                {
                    let mut guard = state.write().await;
                    guard.in_flight = None;
                    guard.history.push(RunRecord::from_outcome(source, &outcome));
                }
                let _ = job.respond_to.send(response);
            }
        }
    }

    Ok(())
}

async fn scheduler_task(
    interval: Option<Duration>,
    marker: TriggerMarker,
    run_tx: mpsc::Sender<RunJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let Some(period) = interval else {
        tracing::info!("scheduled runs disabled");
        let _ = shutdown_rx.recv().await;
        return Ok(());
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; the first scheduled run is one period out.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let request = TriggerRequest::trusted(&marker, "scheduler");
                match enqueue_run(&run_tx, request, ConfigOverrides::default()).await {
                    Ok(response) if response.is_success() => {
                        tracing::info!("scheduled refresh completed");
                    }
                    Ok(response) => {
                        tracing::warn!(status = response.status.code(), "scheduled refresh did not succeed");
                    }
                    Err(DaemonError::Busy) => {
                        tracing::info!("skipping scheduled refresh: a run is already queued");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "scheduled refresh could not be queued");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Answer an external trigger. Requests without the trusted marker are
/// refused here, before they can take the queue slot.
async fn submit_trigger(
    ctx: &ClientContext,
    request: TriggerRequest,
    overrides: ConfigOverrides,
) -> Result<TriggerResponse, DaemonError> {
    let authenticator = TriggerAuthenticator::new(ctx.marker.clone());
    if authenticator.authenticate(&request) == AuthDecision::Deny {
        tracing::warn!(source = %request.source, "trigger rejected: trusted marker missing or wrong");
        let outcome = RunOutcome::Denied;
        ctx.state
            .write()
            .await
            .history
            .push(RunRecord::from_outcome(request.source, &outcome));
        return Ok(TriggerResponse::from_outcome(&outcome));
    }
    enqueue_run(&ctx.run_tx, request, overrides).await
}

/// Queue a run and wait for its response. Refuses with [`DaemonError::Busy`]
/// when a run is already waiting behind the one in flight.
async fn enqueue_run(
    run_tx: &mpsc::Sender<RunJob>,
    request: TriggerRequest,
    overrides: ConfigOverrides,
) -> Result<TriggerResponse, DaemonError> {
    let (tx, rx) = oneshot::channel();
    run_tx
        .try_send(RunJob {
            request,
            overrides,
            respond_to: tx,
        })
        .map_err(|err| match err {
            TrySendError::Full(_) => DaemonError::Busy,
            TrySendError::Closed(_) => DaemonError::ChannelClosed("run queue"),
        })?;

    rx.await
        .map_err(|_| DaemonError::ChannelClosed("run response"))
}

async fn socket_server_task(
    ctx: ClientContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&ctx.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, ctx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, ctx: ClientContext) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&ctx).await),
            "trigger" => {
                let trigger = TriggerRequest {
                    headers: request.headers.unwrap_or_default(),
                    source: "socket".to_string(),
                };
                let overrides = request.overrides.unwrap_or_default();
                match submit_trigger(&ctx, trigger, overrides).await {
                    Ok(response) => DaemonResponse::ok(serde_json::to_value(&response)?),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "stop" => {
                let _ = ctx.shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(ctx: &ClientContext) -> Value {
    let (in_flight, last_run, history) = {
        let state = ctx.state.read().await;
        (
            state.in_flight.clone(),
            state.history.latest().cloned(),
            state.history.records(),
        )
    };
    let queued = RUN_QUEUE_DEPTH.saturating_sub(ctx.run_tx.capacity());

    json!({
        "running": true,
        "label": DAEMON_LABEL,
        "started_at_unix": ctx.started_at_unix,
        "in_flight": in_flight,
        "queued": queued,
        "last_run": last_run,
        "history": history,
        "schedule_interval_secs": ctx.file.schedule_interval().map(|d| d.as_secs()),
        "socket": socket_path(&ctx.home).display().to_string(),
    })
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(LOG_ROTATION_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                // rotate_daemon_logs logs its own failures
                let _ = tokio::task::spawn_blocking(move || {
                    rotate_daemon_logs(&home, RotationPolicy::default());
                })
                .await;
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [siterefresh_root(home), logs_dir(home)] {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// `info` filter; `SITEREFRESH_LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("SITEREFRESH_LOG_FORMAT").is_ok_and(|format| format == "json");
    let _ = if json {
        fmt().json().with_env_filter(filter).with_target(false).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use siterefresh_core::{config::default_trigger_marker, CommandSpec};
    use siterefresh_pipeline::{ResponseStatus, RunState};
    use tempfile::TempDir;
    use tokio::time::Instant;
    use tokio_test::assert_ok;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", ["-c", script])
    }

    fn site_config(root: &TempDir, build: &str) -> ConfigFile {
        fs::create_dir_all(root.path().join("cmd").join("xmlsync")).unwrap();
        ConfigFile {
            working_root: Some(root.path().to_path_buf()),
            sync_command: Some(sh("exit 0")),
            build_command: Some(sh(build)),
            schedule_interval_secs: Some(0),
            ..Default::default()
        }
    }

    fn client_context(
        home: &TempDir,
        run_tx: mpsc::Sender<RunJob>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> ClientContext {
        ClientContext {
            home: home.path().to_path_buf(),
            file: Arc::new(ConfigFile::default()),
            marker: default_trigger_marker(),
            state: Arc::new(RwLock::new(DaemonState::default())),
            run_tx,
            shutdown_tx,
            started_at_unix: 1_000_000,
        }
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn scheduler_skips_first_tick_then_sends_trusted_trigger() {
        let (run_tx, mut run_rx) = mpsc::channel::<RunJob>(RUN_QUEUE_DEPTH);
        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let marker = default_trigger_marker();
        let period = Duration::from_secs(6 * 60 * 60);

        let started = Instant::now();
        let scheduler = tokio::spawn(scheduler_task(
            Some(period),
            marker.clone(),
            run_tx,
            shutdown_tx.subscribe(),
        ));

        let job = run_rx.recv().await.expect("scheduled job");
        assert!(started.elapsed() >= period, "first run waits one full period");
        assert_eq!(job.request.source, "scheduler");
        assert_eq!(job.request.headers.get(&marker.header), Some(&marker.value));

        let _ = job
            .respond_to
            .send(TriggerResponse::from_outcome(&RunOutcome::Denied));
        shutdown_tx.send(()).unwrap();
        assert_ok!(scheduler.await.unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn disabled_scheduler_waits_for_shutdown() {
        let (run_tx, mut run_rx) = mpsc::channel::<RunJob>(RUN_QUEUE_DEPTH);
        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let scheduler = tokio::spawn(scheduler_task(
            None,
            default_trigger_marker(),
            run_tx,
            shutdown_tx.subscribe(),
        ));

        shutdown_tx.send(()).unwrap();
        assert_ok!(scheduler.await.unwrap());
        assert!(run_rx.recv().await.is_none(), "no job was ever queued");
    }

    #[tokio::test]
    async fn trigger_beyond_the_single_slot_is_refused() {
        let (run_tx, _run_rx) = mpsc::channel::<RunJob>(RUN_QUEUE_DEPTH);
        let waiting = {
            let run_tx = run_tx.clone();
            tokio::spawn(async move {
                enqueue_run(&run_tx, TriggerRequest::new("first"), ConfigOverrides::default()).await
            })
        };
        while run_tx.capacity() > 0 {
            tokio::task::yield_now().await;
        }

        let err = enqueue_run(&run_tx, TriggerRequest::new("second"), ConfigOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Busy), "got: {err}");
        assert_eq!(err.to_string(), "refresh run already queued");
        waiting.abort();
    }

    #[tokio::test]
    async fn processor_runs_job_and_records_history() {
        let root = TempDir::new().unwrap();
        let file = Arc::new(site_config(&root, "touch built"));
        let state: SharedState = Arc::new(RwLock::new(DaemonState::default()));
        let (run_tx, run_rx) = mpsc::channel::<RunJob>(RUN_QUEUE_DEPTH);
        let (shutdown_tx, _) = broadcast::channel::<()>(4);

        let processor = tokio::spawn(run_processor_task(
            file,
            state.clone(),
            run_rx,
            shutdown_tx.subscribe(),
        ));

        let marker = default_trigger_marker();
        let response = enqueue_run(
            &run_tx,
            TriggerRequest::trusted(&marker, "test"),
            ConfigOverrides::default(),
        )
        .await
        .expect("run response");
        assert_eq!(response.status, ResponseStatus::Ok);
        assert!(root.path().join("built").exists());

        let denied = enqueue_run(&run_tx, TriggerRequest::new("stranger"), ConfigOverrides::default())
            .await
            .expect("run response");
        assert_eq!(denied.status, ResponseStatus::Unauthorized);

        {
            let guard = state.read().await;
            assert!(guard.in_flight.is_none());
            let sources: Vec<String> =
                guard.history.records().into_iter().map(|r| r.source).collect();
            assert_eq!(sources, vec!["test", "stranger"]);
        }

        shutdown_tx.send(()).unwrap();
        assert_ok!(processor.await.unwrap());
    }

    #[tokio::test]
    async fn status_payload_reports_history_and_queue() {
        let home = TempDir::new().unwrap();
        let (run_tx, _run_rx) = mpsc::channel::<RunJob>(RUN_QUEUE_DEPTH);
        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let ctx = client_context(&home, run_tx, shutdown_tx);
        ctx.state
            .write()
            .await
            .history
            .push(RunRecord::from_outcome("socket", &RunOutcome::Denied));

        let payload = build_status_payload(&ctx).await;

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["started_at_unix"], json!(1_000_000u64));
        assert_eq!(payload["queued"], json!(0));
        assert_eq!(payload["in_flight"], Value::Null);
        assert_eq!(payload["schedule_interval_secs"], json!(6 * 60 * 60));
        assert_eq!(payload["history"].as_array().map(Vec::len), Some(1));
        assert_eq!(payload["last_run"]["state"], json!("denied"));
        assert_eq!(payload["last_run"]["status"], json!(401));
    }

    #[tokio::test]
    async fn untrusted_trigger_is_answered_without_taking_the_queue_slot() {
        let home = TempDir::new().unwrap();
        let (run_tx, mut run_rx) = mpsc::channel::<RunJob>(RUN_QUEUE_DEPTH);
        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let ctx = client_context(&home, run_tx, shutdown_tx);

        let denied = submit_trigger(&ctx, TriggerRequest::new("socket"), ConfigOverrides::default())
            .await
            .expect("immediate response");
        assert_eq!(denied.status, ResponseStatus::Unauthorized);
        assert_eq!(ctx.run_tx.capacity(), RUN_QUEUE_DEPTH, "slot still free");
        assert!(run_rx.try_recv().is_err(), "nothing was queued");
        {
            let records = ctx.state.read().await.history.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].state, RunState::Denied);
        }

        let trusted = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let request = TriggerRequest::trusted(&default_trigger_marker(), "scheduler");
                submit_trigger(&ctx, request, ConfigOverrides::default()).await
            })
        };
        let job = run_rx.recv().await.expect("trusted trigger queued");
        assert_eq!(job.request.source, "scheduler");
        let _ = job
            .respond_to
            .send(TriggerResponse::from_outcome(&RunOutcome::Denied));
        assert_ok!(trusted.await.unwrap());
    }

    #[tokio::test]
    async fn daemon_refuses_to_start_with_an_empty_marker() {
        let home = TempDir::new().unwrap();
        let file = ConfigFile {
            trigger: Some(TriggerMarker {
                header: String::new(),
                value: "true".to_string(),
            }),
            ..Default::default()
        };

        let err = run(home.path().to_path_buf(), file).await.unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)), "got: {err}");
        assert!(!socket_path(home.path()).exists());
    }

    #[test]
    fn stale_socket_file_is_removed_before_bind() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        fs::write(&socket, b"").unwrap();

        prepare_socket_for_bind(&socket).expect("stale socket cleared");
        assert!(!socket.exists());
    }
}
