//! # siterefresh-pipeline
//!
//! Trigger authentication and the two-stage sync-and-rebuild run.
//!
//! Call [`Orchestrator::run`] with a [`TriggerRequest`] and the run's
//! [`ConfigLayers`](siterefresh_core::config::ConfigLayers); it returns a
//! [`RunOutcome`] which [`TriggerResponse::from_outcome`] maps onto the
//! caller-facing response contract.

pub mod auth;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod response;
pub mod runner;
pub mod stage;

pub use auth::{AuthDecision, TriggerAuthenticator, TriggerRequest};
pub use error::PipelineError;
pub use orchestrator::{Orchestrator, RunOutcome, RunState};
pub use response::{ResponseBody, ResponseStatus, TriggerResponse};
pub use runner::{compose_environment, Invocation, ProcessRunner, RunResult, SystemRunner};
pub use stage::PipelineStage;
