use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProbeError;
use crate::models::{ProbeItem, ProbeTarget};

/// Final state of one probe execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Succeeded,
    Failed,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Succeeded => write!(f, "succeeded"),
            ProbeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The rule that decided a successful result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedRule {
    ExactStatus,
    StatusRange,
    StatusList,
    BodyEquals,
    BodyContains,
    BodyRegex,
    Extract,
    /// No criteria configured and the transport reported no error
    CleanResponse,
    /// Every ICMP echo was answered
    Reachable,
}

/// One item resolved for a single execution, as it travels through the queue
#[derive(Debug, Clone)]
pub struct QueuedProbe {
    pub group: Arc<str>,
    pub item: Arc<ProbeItem>,
    pub timeout: Duration,
    /// Echo count for ICMP items, ignored for HTTP
    pub repeat: u32,
    pub enqueued_at: Instant,
}

impl QueuedProbe {
    pub fn new(group: Arc<str>, item: Arc<ProbeItem>, timeout: Duration, repeat: u32) -> Self {
        Self { group, item, timeout, repeat, enqueued_at: Instant::now() }
    }

    pub fn name(&self) -> &str {
        &self.item.name
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.item.target
    }
}

/// What the network said, before any success criteria are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Echo { replies: u32 },
    Http { status_code: u16, body: Option<String> },
}

/// Raw outcome of one probe execution
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub observation: Result<Observation, ProbeError>,
    pub latency: Duration,
    pub finished_at: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn new(observation: Result<Observation, ProbeError>, latency: Duration) -> Self {
        Self { observation, latency, finished_at: Utc::now() }
    }
}

/// Evaluated result of one probe execution. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    id: Uuid,
    group: String,
    item: String,
    kind: String,
    target: String,
    timestamp: DateTime<Utc>,
    status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched: Option<MatchedRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reachable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    latency_ms: u64,
}

impl ProbeResult {
    pub(crate) fn new(probe: &QueuedProbe, outcome: &ProbeOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            group: probe.group.to_string(),
            item: probe.item.name.clone(),
            kind: probe.target().kind().to_string(),
            target: probe.target().describe().to_string(),
            timestamp: outcome.finished_at,
            status: ProbeStatus::Failed,
            matched: None,
            status_code: None,
            reachable: None,
            body: None,
            error: None,
            latency_ms: outcome.latency.as_millis() as u64,
        }
    }

    pub(crate) fn succeeded(mut self, rule: MatchedRule) -> Self {
        self.status = ProbeStatus::Succeeded;
        self.matched = Some(rule);
        self.error = None;
        self
    }

    pub(crate) fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = ProbeStatus::Failed;
        self.matched = None;
        self.error = Some(error.into());
        self
    }

    pub(crate) fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub(crate) fn with_reachable(mut self, reachable: bool) -> Self {
        self.reachable = Some(reachable);
        self
    }

    pub(crate) fn with_body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn item(&self) -> &str {
        &self.item
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> ProbeStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ProbeStatus::Succeeded
    }

    pub fn matched(&self) -> Option<MatchedRule> {
        self.matched
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn reachable(&self) -> Option<bool> {
        self.reachable
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency_ms
    }
}
