//! Caller-facing response contract.
//!
//! Exactly one of three shapes:
//!
//! | status | body |
//! |---|---|
//! | 401 | `{ "error": "Unauthorized" }` |
//! | 500 | `{ "error", "details" }` (stage failure) or `{ "error", "details", "timestamp" }` (fault) |
//! | 200 | `{ "success": true, "message", "duration": "<secs>s", "timestamp" }` |

use serde::{Deserialize, Serialize};

use siterefresh_core::PipelineOutcome;

use crate::orchestrator::RunOutcome;

pub const UNAUTHORIZED: &str = "Unauthorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum ResponseStatus {
    Ok,
    Unauthorized,
    ServerError,
}

impl ResponseStatus {
    pub fn code(self) -> u16 {
        match self {
            ResponseStatus::Ok => 200,
            ResponseStatus::Unauthorized => 401,
            ResponseStatus::ServerError => 500,
        }
    }
}

impl From<ResponseStatus> for u16 {
    fn from(status: ResponseStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u16> for ResponseStatus {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            200 => Ok(ResponseStatus::Ok),
            401 => Ok(ResponseStatus::Unauthorized),
            500 => Ok(ResponseStatus::ServerError),
            other => Err(format!("unexpected response status {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Success {
        success: bool,
        message: String,
        duration: String,
        timestamp: String,
    },
    Failure {
        error: String,
        details: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    Unauthorized {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub status: ResponseStatus,
    pub body: ResponseBody,
}

impl TriggerResponse {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Denied => Self {
                status: ResponseStatus::Unauthorized,
                body: ResponseBody::Unauthorized {
                    error: UNAUTHORIZED.to_string(),
                },
            },
            RunOutcome::Completed(outcome) => Self::from_pipeline(outcome),
        }
    }

    fn from_pipeline(outcome: &PipelineOutcome) -> Self {
        if outcome.success {
            return Self {
                status: ResponseStatus::Ok,
                body: ResponseBody::Success {
                    success: true,
                    message: outcome.message.clone(),
                    duration: outcome.duration_label(),
                    timestamp: outcome.timestamp_label(),
                },
            };
        }

        let details = outcome
            .error_details
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "no error detail captured".to_string());
        // Faults outside the stages carry a timestamp; stage failures do not.
        let timestamp = outcome
            .failed_stage
            .is_none()
            .then(|| outcome.timestamp_label());
        Self {
            status: ResponseStatus::ServerError,
            body: ResponseBody::Failure {
                error: outcome.message.clone(),
                details,
                timestamp,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}
