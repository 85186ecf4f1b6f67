use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::ProbeExecutor;
use super::queue::ProbeQueue;
use super::types::{ProbeResult, QueuedProbe};
use crate::error::ProbeError;
use crate::events::{AgentDispatcher, Event, EventName};

/// Number of workers when none is configured
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Everything a worker needs, shared by the whole pool
pub struct WorkerContext {
    pub queue: Arc<ProbeQueue>,
    pub executor: ProbeExecutor,
    pub dispatcher: Arc<AgentDispatcher>,
}

/// Counters of the pool since it was spawned
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub aborted: AtomicU64,
}

/// Fixed set of workers draining the probe queue
pub struct WorkerPool {
    workers: JoinSet<()>,
    shutdown: CancellationToken,
    abort: CancellationToken,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    pub fn spawn(size: usize, context: WorkerContext) -> Self {
        let size = size.max(1);
        let context = Arc::new(context);
        let shutdown = CancellationToken::new();
        let abort = CancellationToken::new();
        let stats = Arc::new(WorkerStats::default());

        let mut workers = JoinSet::new();
        for id in 0..size {
            workers.spawn(work(
                id,
                context.clone(),
                shutdown.clone(),
                abort.clone(),
                stats.clone(),
            ));
        }

        info!(workers = size, "probe workers started");
        Self { workers, shutdown, abort, stats }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> &Arc<WorkerStats> {
        &self.stats
    }

    /// Stop pulling once the queue is empty, waiting at most `deadline`.
    ///
    /// Past the deadline in-flight probes are aborted. Returns whether the
    /// queue was drained in time.
    pub async fn drain(mut self, deadline: Duration) -> bool {
        self.shutdown.cancel();

        let workers = &mut self.workers;
        let drained = tokio::time::timeout(deadline, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "probe worker failed");
                }
            }
        })
        .await
        .is_ok();

        if !drained {
            warn!(deadline_secs = deadline.as_secs_f64(), "drain deadline elapsed, aborting probes");
            self.abort.cancel();
            while self.workers.join_next().await.is_some() {}
        }

        drained
    }
}

async fn work(
    id: usize,
    context: Arc<WorkerContext>,
    shutdown: CancellationToken,
    abort: CancellationToken,
    stats: Arc<WorkerStats>,
) {
    debug!(worker = id, "probe worker running");

    while let Some(probe) = context.queue.dequeue(&shutdown).await {
        let result = tokio::select! {
            biased;
            _ = abort.cancelled() => {
                stats.aborted.fetch_add(1, Ordering::Relaxed);
                warn!(
                    group = %probe.group,
                    item = probe.name(),
                    error = %ProbeError::Cancelled,
                    "probe aborted"
                );
                break;
            }
            result = context.executor.run(&probe) => result,
        };

        if result.is_success() {
            stats.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        emit(&context, &probe, result).await;
    }

    debug!(worker = id, "probe worker stopped");
}

async fn emit(context: &WorkerContext, probe: &QueuedProbe, result: ProbeResult) {
    let waited_ms = probe.enqueued_at.elapsed().as_millis() as u64;

    if result.is_success() {
        info!(
            group = result.group(),
            item = result.item(),
            target = result.target(),
            status_code = result.status_code(),
            matched = ?result.matched(),
            latency_ms = result.latency_ms(),
            waited_ms,
            "probe succeeded"
        );
    } else {
        warn!(
            group = result.group(),
            item = result.item(),
            target = result.target(),
            status_code = result.status_code(),
            reachable = result.reachable(),
            error = result.error().unwrap_or_default(),
            latency_ms = result.latency_ms(),
            waited_ms,
            "probe failed"
        );
    }

    if !context.dispatcher.is_registered(EventName::ProbeCompleted) {
        return;
    }

    if let Err(e) =
        context.dispatcher.dispatch(EventName::ProbeCompleted, Event::ProbeCompleted(result)).await
    {
        warn!(error = %e, "failed to dispatch probe result");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mediator::Inbox;

    use super::*;
    use crate::models::ProbeItem;
    use crate::monitoring::checker::Checker;
    use crate::monitoring::types::Observation;

    struct Status(u16);

    #[async_trait]
    impl Checker for Status {
        async fn check(&self, _probe: &QueuedProbe) -> Result<Observation, ProbeError> {
            Ok(Observation::Http { status_code: self.0, body: None })
        }
    }

    struct Hang;

    #[async_trait]
    impl Checker for Hang {
        async fn check(&self, _probe: &QueuedProbe) -> Result<Observation, ProbeError> {
            std::future::pending().await
        }
    }

    fn http_probe(name: &str, timeout: Duration) -> QueuedProbe {
        QueuedProbe::new(
            Arc::from("web"),
            Arc::new(ProbeItem::check_status(name, "http://localhost/")),
            timeout,
            1,
        )
    }

    #[tokio::test]
    async fn test_workers_emit_every_result() {
        let queue = Arc::new(ProbeQueue::new(16));
        let lane = queue.add_lane("web");
        let dispatcher = Arc::new(AgentDispatcher::new());
        let (inbox, mut results) = Inbox::<EventName, Event>::new(16);
        dispatcher.register(inbox, &[EventName::ProbeCompleted]).unwrap();

        let executor = ProbeExecutor::with_checkers(Arc::new(Status(503)), Arc::new(Hang));
        let pool = WorkerPool::spawn(
            3,
            WorkerContext { queue: queue.clone(), executor, dispatcher: dispatcher.clone() },
        );
        assert_eq!(pool.size(), 3);

        for name in ["a", "b", "c", "d"] {
            queue.enqueue(lane, http_probe(name, Duration::from_secs(1))).await.unwrap();
        }

        let mut names = Vec::new();
        for _ in 0..4 {
            let delivery = tokio::time::timeout(Duration::from_secs(2), results.recv())
                .await
                .unwrap()
                .unwrap();
            let Event::ProbeCompleted(result) = delivery.payload else {
                panic!("unexpected payload");
            };
            assert!(!result.is_success());
            assert_eq!(result.status_code(), Some(503));
            names.push(result.item().to_string());
        }
        names.sort();
        assert_eq!(names, vec!["a", "b", "c", "d"]);

        let stats = pool.stats().clone();
        assert!(pool.drain(Duration::from_secs(1)).await);
        assert_eq!(stats.failed.load(Ordering::Relaxed), 4);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_drain_deadline_aborts_in_flight_probes() {
        let queue = Arc::new(ProbeQueue::new(16));
        let lane = queue.add_lane("web");
        let dispatcher = Arc::new(AgentDispatcher::new());
        let (inbox, mut results) = Inbox::<EventName, Event>::new(16);
        dispatcher.register(inbox, &[EventName::ProbeCompleted]).unwrap();

        let executor = ProbeExecutor::with_checkers(Arc::new(Hang), Arc::new(Hang));
        let pool = WorkerPool::spawn(
            1,
            WorkerContext { queue: queue.clone(), executor, dispatcher: dispatcher.clone() },
        );

        queue.enqueue(lane, http_probe("stuck", Duration::from_secs(600))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stats = pool.stats().clone();
        assert!(!pool.drain(Duration::from_millis(100)).await);
        assert_eq!(stats.aborted.load(Ordering::Relaxed), 1);

        // Aborted probes are not emitted
        let nothing = tokio::time::timeout(Duration::from_millis(100), results.recv()).await;
        assert!(nothing.is_err());
        dispatcher.shutdown().await;
    }
}
