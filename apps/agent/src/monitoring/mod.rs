pub mod checker;
/// Probe pipeline: scheduler -> queue -> workers -> prober -> evaluator.
///
/// This module is responsible for:
/// - Firing every group on its own interval
/// - Buffering pending probes in per-group lanes
/// - Running ICMP and HTTP probes under a hard deadline
/// - Turning raw outcomes into immutable results
pub mod evaluator;
pub mod executor;
pub mod queue;
pub mod scheduler;
pub mod types;
pub mod worker;

pub use checker::{Checker, EchoTransport, HttpChecker, IcmpChecker, SurgeTransport};
pub use executor::ProbeExecutor;
pub use queue::{LaneId, LaneStats, ProbeQueue, QueueStats};
pub use scheduler::{MonitoringScheduler, ScheduledGroup};
pub use types::{MatchedRule, Observation, ProbeOutcome, ProbeResult, ProbeStatus, QueuedProbe};
pub use worker::{WorkerContext, WorkerPool, WorkerStats};
