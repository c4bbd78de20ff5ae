//! Pipeline stages: one external invocation plus a failure policy.

use std::time::Instant;

use siterefresh_core::{EnvSnapshot, FailurePolicy, PipelineConfig, StageName, StageResult};

use crate::runner::{compose_environment, Invocation, ProcessRunner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    pub name: StageName,
    pub policy: FailurePolicy,
    pub invocation: Invocation,
}

impl PipelineStage {
    pub fn new(name: StageName, policy: FailurePolicy, invocation: Invocation) -> Self {
        Self {
            name,
            policy,
            invocation,
        }
    }

    /// Data sync: runs the sync command inside the sync tool directory.
    /// Non-fatal, so a stale feed still gets a rebuild.
    pub fn sync(config: &PipelineConfig, ambient: &EnvSnapshot) -> Self {
        Self::from_config(
            StageName::Sync,
            FailurePolicy::NonFatal,
            config,
            ambient,
        )
    }

    /// Site build: runs the build command from the working root. Fatal.
    pub fn build(config: &PipelineConfig, ambient: &EnvSnapshot) -> Self {
        Self::from_config(StageName::Build, FailurePolicy::Fatal, config, ambient)
    }

    /// The stages of one run, in order.
    pub fn plan(config: &PipelineConfig, ambient: &EnvSnapshot) -> Vec<Self> {
        vec![Self::sync(config, ambient), Self::build(config, ambient)]
    }

    fn from_config(
        name: StageName,
        policy: FailurePolicy,
        config: &PipelineConfig,
        ambient: &EnvSnapshot,
    ) -> Self {
        let (command, working_dir) = match name {
            StageName::Sync => (config.sync_command.clone(), config.sync_tool_dir.clone()),
            StageName::Build => (config.build_command.clone(), config.working_root.clone()),
        };
        Self::new(
            name,
            policy,
            Invocation {
                label: name.to_string(),
                command,
                working_dir,
                environment: compose_environment(ambient.vars(), &config.tool_environment()),
                timeout: config.stage_timeout,
            },
        )
    }

    /// Run the stage. A failed result always carries a non-empty message.
    pub fn execute<R: ProcessRunner + ?Sized>(&self, runner: &R) -> StageResult {
        tracing::info!(
            stage = %self.name,
            policy = %self.policy,
            command = %self.invocation.command,
            dir = %self.invocation.working_dir.display(),
            "running stage",
        );
        let started = Instant::now();
        let result = runner.run(&self.invocation);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let error_message = if result.succeeded {
            None
        } else {
            Some(
                result
                    .error_message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| format!("{} stage failed", self.name)),
            )
        };

        StageResult {
            stage: self.name,
            policy: self.policy,
            succeeded: result.succeeded,
            error_message,
            duration_ms,
        }
    }
}
