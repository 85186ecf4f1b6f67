use std::io::Error as IoError;
use std::path::PathBuf;
use std::time::Duration;

use mediator::DispatchError;
use thiserror::Error;

/// Failures while loading, validating or writing the agent configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no config path available, set XDG_CONFIG_HOME or HOME")]
    PathUnavailable,
    #[error("invalid {scope}: {reason}")]
    Invalid { scope: String, reason: String },
}

/// Why a single probe execution failed.
///
/// Always turned into a failed `ProbeResult`; never fatal to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("request construction failed: {0}")]
    RequestConstruction(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("probe cancelled")]
    Cancelled,
}

/// A success rule that could not be applied. Evaluated as "does not match".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("invalid json path '{0}'")]
    InvalidPath(String),
    #[error("response body is not json: {0}")]
    NotJson(String),
    #[error("invalid body pattern: {0}")]
    InvalidPattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("unknown queue lane {0}")]
    UnknownLane(usize),
    #[error("probe queue closed")]
    Closed,
}

/// Startup and wiring failures of the agent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("event wiring failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("failed to build prober: {0}")]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("agent already started")]
    AlreadyStarted,
}
