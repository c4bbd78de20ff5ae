//! Bounded record of completed runs, newest last.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siterefresh_pipeline::{RunOutcome, RunState, TriggerResponse};

use crate::paths::HISTORY_LIMIT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub source: String,
    pub state: RunState,
    /// Response status the trigger received (200, 401 or 500).
    pub status: u16,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn from_outcome(source: impl Into<String>, outcome: &RunOutcome) -> Self {
        let report = outcome.outcome();
        Self {
            source: source.into(),
            state: outcome.final_state(),
            status: TriggerResponse::from_outcome(outcome).status.code(),
            finished_at: report.map_or_else(Utc::now, |r| r.timestamp),
            duration_seconds: report.map(|r| r.duration_seconds),
            message: report.map(|r| r.message.clone()),
            error: report.and_then(|r| r.error_details.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunHistory {
    records: VecDeque<RunRecord>,
    limit: usize,
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }
}

impl RunHistory {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Append `record`, dropping the oldest entry once the limit is reached.
    pub fn push(&mut self, record: RunRecord) {
        if self.limit == 0 {
            return;
        }
        while self.records.len() >= self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn latest(&self) -> Option<&RunRecord> {
        self.records.back()
    }

    /// Oldest first.
    pub fn records(&self) -> Vec<RunRecord> {
        self.records.iter().cloned().collect()
    }
}
