//! Uppe agent - scheduled ICMP and HTTP probing.
//!
//! Probe groups fire on their own interval into per-group queue lanes. A
//! fixed worker pool runs each probe under a hard deadline, evaluates the
//! outcome against the item's success criteria and publishes the result as a
//! `probe.completed` event.

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod monitoring;
pub mod orchestrator;
pub mod output;
pub mod settings;
pub mod validation;

pub use config::AgentConfig;
pub use error::{AgentError, ConfigError, EvaluationError, ProbeError, QueueError};
pub use events::{AgentDispatcher, Event, EventName};
pub use orchestrator::Agent;
