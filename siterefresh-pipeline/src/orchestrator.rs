//! The sync-and-rebuild run.
//!
//! ```text
//! Idle -> Authenticating -> Denied
//!                        -> Syncing -> Building -> Succeeded
//!                                               -> Failed
//!         (any fault after authentication)      -> Failed
//! ```
//!
//! Sync failures are logged and the build still runs against the content
//! already on disk. A build failure ends the run; the published site is
//! never reported as refreshed when the build did not complete.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use siterefresh_core::{
    config::ConfigLayers, types::format_duration, FailurePolicy, PipelineOutcome, StageName,
    StageResult,
};

use crate::auth::{AuthDecision, TriggerAuthenticator, TriggerRequest};
use crate::error::PipelineError;
use crate::lock::RunLock;
use crate::runner::ProcessRunner;
use crate::stage::PipelineStage;

/// Caller-facing error label for faults outside the stages.
pub const FAULT_LABEL: &str = "Refresh job failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Authenticating,
    Syncing,
    Building,
    Succeeded,
    Denied,
    Failed,
}

impl RunState {
    fn for_stage(stage: StageName) -> Self {
        match stage {
            StageName::Sync => RunState::Syncing,
            StageName::Build => RunState::Building,
        }
    }
}

/// Terminal value of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RunOutcome {
    /// Trigger rejected; nothing ran and no timing was taken.
    Denied,
    Completed(PipelineOutcome),
}

impl RunOutcome {
    pub fn final_state(&self) -> RunState {
        match self {
            RunOutcome::Denied => RunState::Denied,
            RunOutcome::Completed(outcome) if outcome.success => RunState::Succeeded,
            RunOutcome::Completed(_) => RunState::Failed,
        }
    }

    pub fn outcome(&self) -> Option<&PipelineOutcome> {
        match self {
            RunOutcome::Denied => None,
            RunOutcome::Completed(outcome) => Some(outcome),
        }
    }
}

/// Why an authenticated run did not succeed.
enum Failure {
    Stage { stage: StageName, message: String },
    Fault(String),
}

impl From<PipelineError> for Failure {
    fn from(err: PipelineError) -> Self {
        Failure::Fault(err.to_string())
    }
}

pub struct Orchestrator<R> {
    runner: R,
}

impl<R: ProcessRunner> Orchestrator<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Authenticate `request` and, if allowed, run sync then build.
    ///
    /// Never panics and never returns an error: every terminal state is a
    /// [`RunOutcome`].
    pub fn run(&self, request: &TriggerRequest, layers: &ConfigLayers) -> RunOutcome {
        let mut state = RunState::Idle;
        transition(&mut state, RunState::Authenticating);

        let decision = match layers.trigger_marker() {
            Ok(marker) => TriggerAuthenticator::new(marker).authenticate(request),
            Err(err) => {
                tracing::error!(error = %err, "trusted marker is misconfigured; rejecting trigger");
                AuthDecision::Deny
            }
        };
        if decision == AuthDecision::Deny {
            transition(&mut state, RunState::Denied);
            tracing::warn!(source = %request.source, "trigger rejected: trusted marker missing or wrong");
            return RunOutcome::Denied;
        }

        let started = Instant::now();
        tracing::info!(source = %request.source, "starting sync and site rebuild");

        let mut stages = Vec::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_stages(&mut state, layers, &mut stages)
        }))
        .unwrap_or_else(|payload| Err(Failure::Fault(panic_message(payload.as_ref()))));

        let duration_seconds = started.elapsed().as_secs_f64();
        let timestamp = Utc::now();

        let outcome = match result {
            Ok(()) => {
                transition(&mut state, RunState::Succeeded);
                let message = format!(
                    "Sync and rebuild completed in {}",
                    format_duration(duration_seconds)
                );
                tracing::info!(duration_seconds, "{message}");
                PipelineOutcome {
                    success: true,
                    message,
                    duration_seconds,
                    timestamp,
                    error_details: None,
                    failed_stage: None,
                    stages,
                }
            }
            Err(Failure::Stage { stage, message }) => {
                transition(&mut state, RunState::Failed);
                tracing::error!(stage = %stage, error = %message, "stage failed; run aborted");
                PipelineOutcome {
                    success: false,
                    message: stage.failure_label().to_string(),
                    duration_seconds,
                    timestamp,
                    error_details: Some(message),
                    failed_stage: Some(stage),
                    stages,
                }
            }
            Err(Failure::Fault(message)) => {
                transition(&mut state, RunState::Failed);
                tracing::error!(error = %message, "refresh run failed");
                PipelineOutcome {
                    success: false,
                    message: FAULT_LABEL.to_string(),
                    duration_seconds,
                    timestamp,
                    error_details: Some(message),
                    failed_stage: None,
                    stages,
                }
            }
        };
        RunOutcome::Completed(outcome)
    }

    fn run_stages(
        &self,
        state: &mut RunState,
        layers: &ConfigLayers,
        results: &mut Vec<StageResult>,
    ) -> Result<(), Failure> {
        let config = layers.resolve().map_err(PipelineError::from)?;
        let _lock = RunLock::acquire(&config.lock_path(), config.lock_stale_after)?;

        for stage in PipelineStage::plan(&config, &layers.env) {
            transition(state, RunState::for_stage(stage.name));
            let result = stage.execute(&self.runner);
            let failure = (!result.succeeded).then(|| result.error_message.clone().unwrap_or_default());
            results.push(result);

            match (failure, stage.policy) {
                (None, _) => tracing::info!(stage = %stage.name, "stage completed"),
                (Some(message), FailurePolicy::NonFatal) => tracing::warn!(
                    stage = %stage.name,
                    error = %message,
                    "stage failed; continuing, site will be rebuilt from existing content",
                ),
                (Some(message), FailurePolicy::Fatal) => {
                    return Err(Failure::Stage {
                        stage: stage.name,
                        message,
                    });
                }
            }
        }
        Ok(())
    }
}

fn transition(state: &mut RunState, to: RunState) {
    let from = *state;
    tracing::debug!(?from, ?to, "run state");
    *state = to;
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("refresh run panicked: {detail}")
}
