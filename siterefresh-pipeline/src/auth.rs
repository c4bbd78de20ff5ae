//! Trigger authentication: a single trusted-source marker header.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use siterefresh_core::TriggerMarker;

/// An inbound invocation: a header bag plus a label naming where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "unknown".to_string()
}

impl TriggerRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            headers: BTreeMap::new(),
            source: source.into(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// A request that carries `marker`; used by internal callers such as the
    /// scheduler and the local CLI.
    pub fn trusted(marker: &TriggerMarker, source: impl Into<String>) -> Self {
        Self::new(source).with_header(marker.header.clone(), marker.value.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny,
}

/// Accepts a request iff its marker header equals the expected value exactly.
#[derive(Debug, Clone)]
pub struct TriggerAuthenticator {
    marker: TriggerMarker,
}

impl TriggerAuthenticator {
    pub fn new(marker: TriggerMarker) -> Self {
        Self { marker }
    }

    /// Byte-for-byte comparison; no trimming, case folding or prefix match.
    pub fn authenticate(&self, request: &TriggerRequest) -> AuthDecision {
        match request.headers.get(&self.marker.header) {
            Some(value) if *value == self.marker.value => AuthDecision::Allow,
            _ => AuthDecision::Deny,
        }
    }
}
