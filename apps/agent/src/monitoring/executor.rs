use std::sync::Arc;

use tokio::time::Instant;

use super::checker::{Checker, HttpChecker, IcmpChecker};
use super::evaluator::evaluate;
use super::types::{ProbeOutcome, ProbeResult, QueuedProbe};
use crate::error::ProbeError;
use crate::models::ProbeTarget;

/// Probe executor - runs one queued probe against its strategy under a hard deadline
#[derive(Clone)]
pub struct ProbeExecutor {
    http_checker: Arc<dyn Checker>,
    icmp_checker: Arc<dyn Checker>,
}

impl ProbeExecutor {
    pub fn new() -> Result<Self, ProbeError> {
        Ok(Self {
            http_checker: Arc::new(HttpChecker::new()?),
            icmp_checker: Arc::new(IcmpChecker::new()),
        })
    }

    /// Executor with custom strategies, used to swap the network out in tests
    pub fn with_checkers(http_checker: Arc<dyn Checker>, icmp_checker: Arc<dyn Checker>) -> Self {
        Self { http_checker, icmp_checker }
    }

    fn checker_for(&self, target: &ProbeTarget) -> &dyn Checker {
        match target {
            ProbeTarget::Http(_) => self.http_checker.as_ref(),
            ProbeTarget::Icmp(_) => self.icmp_checker.as_ref(),
        }
    }

    /// Execute the probe. The strategy never runs past `probe.timeout`.
    pub async fn execute(&self, probe: &QueuedProbe) -> ProbeOutcome {
        let checker = self.checker_for(probe.target());
        let started = Instant::now();

        let observation = match tokio::time::timeout(probe.timeout, checker.check(probe)).await {
            Ok(observation) => observation,
            Err(_) => Err(ProbeError::Timeout(probe.timeout)),
        };

        ProbeOutcome::new(observation, started.elapsed())
    }

    /// Execute and evaluate
    pub async fn run(&self, probe: &QueuedProbe) -> ProbeResult {
        let outcome = self.execute(probe).await;
        evaluate(probe, &outcome)
    }
}
