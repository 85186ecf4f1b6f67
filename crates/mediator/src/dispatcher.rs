use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::listener::Listener;
use crate::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS, EventKey};

/// Dispatcher sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of delivery workers
    pub workers: usize,
    /// Pending jobs each worker can hold before `dispatch` waits
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { workers: DEFAULT_WORKERS, queue_capacity: DEFAULT_QUEUE_CAPACITY }
    }
}

struct Binding<N, P> {
    listener: Arc<dyn Listener<N, P>>,
    shard: usize,
}

struct Registry<N, P> {
    events: HashMap<N, Binding<N, P>>,
    after_events: HashMap<N, N>,
    next_shard: usize,
}

impl<N: EventKey, P> Registry<N, P> {
    fn new() -> Self {
        Self { events: HashMap::new(), after_events: HashMap::new(), next_shard: 0 }
    }

    fn listener(&self, name: &N) -> Option<Arc<dyn Listener<N, P>>> {
        self.events.get(name).map(|binding| binding.listener.clone())
    }
}

struct Job<N, P> {
    name: N,
    payload: P,
}

/// Event dispatcher with a fixed delivery pool.
///
/// Registration happens at startup; steady-state dispatch only reads the
/// registry. Each worker owns its own bounded job queue and every listener is
/// pinned to one worker, which keeps per-listener delivery in submission order.
pub struct Dispatcher<N, P> {
    registry: Arc<RwLock<Registry<N, P>>>,
    shards: Vec<mpsc::Sender<Job<N, P>>>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<N, P> Dispatcher<N, P>
where
    N: EventKey,
    P: Clone + Send + 'static,
{
    /// Create a dispatcher with the default pool size. Must run inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create a dispatcher with explicit sizing. Must run inside a tokio runtime.
    pub fn with_config(config: DispatcherConfig) -> Self {
        let worker_count = config.workers.max(1);
        let registry = Arc::new(RwLock::new(Registry::new()));
        let cancel = CancellationToken::new();

        let mut shards = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for shard in 0..worker_count {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            shards.push(tx);
            workers.push(tokio::spawn(consume(shard, rx, registry.clone(), cancel.clone())));
        }

        debug!(workers = worker_count, capacity = config.queue_capacity, "dispatcher started");

        Self { registry, shards, cancel, workers: Mutex::new(workers) }
    }

    /// Bind `listener` to every name in `names`.
    ///
    /// The call is all-or-nothing: if any name is already bound, nothing is
    /// registered and the existing bindings stay authoritative.
    pub fn register(
        &self,
        listener: Arc<dyn Listener<N, P>>,
        names: &[N],
    ) -> Result<(), DispatchError> {
        let mut registry = self.registry.write();

        if let Some(taken) = names.iter().find(|name| registry.events.contains_key(name)) {
            return Err(DispatchError::AlreadyRegistered(taken.to_string()));
        }

        let existing = registry
            .events
            .values()
            .find(|binding| same_listener(&binding.listener, &listener))
            .map(|binding| binding.shard);
        let shard = match existing {
            Some(shard) => shard,
            None => {
                let shard = registry.next_shard % self.shards.len();
                registry.next_shard += 1;
                shard
            }
        };

        for name in names {
            registry.events.insert(*name, Binding { listener: listener.clone(), shard });
            debug!(event = %name, shard, "listener registered");
        }

        Ok(())
    }

    /// Chain `to` after `from`: every dispatch of `from` is followed by a
    /// dispatch of the same payload to `to`. Both names must already be bound.
    pub fn set_after_event(&self, from: N, to: N) -> Result<(), DispatchError> {
        let mut registry = self.registry.write();
        for name in [from, to] {
            if !registry.events.contains_key(&name) {
                return Err(DispatchError::NotRegistered(name.to_string()));
            }
        }
        registry.after_events.insert(from, to);
        debug!(from = %from, to = %to, "after-event registered");
        Ok(())
    }

    /// Whether a listener is bound to `name`
    pub fn is_registered(&self, name: N) -> bool {
        self.registry.read().events.contains_key(&name)
    }

    /// Names that currently have a listener
    pub fn registered_names(&self) -> Vec<N> {
        self.registry.read().events.keys().copied().collect()
    }

    /// Queue `payload` for the listener bound to `name`.
    ///
    /// Returns once the job is accepted by the delivery pool, not when the
    /// listener has seen it. Waits while the target worker's queue is full.
    pub async fn dispatch(&self, name: N, payload: P) -> Result<(), DispatchError> {
        if self.cancel.is_cancelled() {
            return Err(DispatchError::Closed);
        }

        let (shard, chained) = {
            let registry = self.registry.read();
            let binding = registry
                .events
                .get(&name)
                .ok_or_else(|| DispatchError::NotRegistered(name.to_string()))?;
            let chained = registry.after_events.get(&name).and_then(|next| {
                registry.events.get(next).map(|binding| (*next, binding.shard))
            });
            (binding.shard, chained)
        };

        match chained {
            Some((next, next_shard)) => {
                self.enqueue(shard, name, payload.clone()).await?;
                self.enqueue(next_shard, next, payload).await
            }
            None => self.enqueue(shard, name, payload).await,
        }
    }

    async fn enqueue(&self, shard: usize, name: N, payload: P) -> Result<(), DispatchError> {
        let sender = self.shards.get(shard).ok_or(DispatchError::Closed)?;
        sender.send(Job { name, payload }).await.map_err(|_| DispatchError::Closed)
    }

    /// Stop accepting dispatches, deliver what was already accepted and wait
    /// for the workers to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(error) = worker.await {
                warn!(%error, "dispatcher worker terminated abnormally");
            }
        }
        debug!("dispatcher stopped");
    }
}

impl<N, P> Default for Dispatcher<N, P>
where
    N: EventKey,
    P: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn same_listener<N, P>(a: &Arc<dyn Listener<N, P>>, b: &Arc<dyn Listener<N, P>>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

async fn consume<N, P>(
    shard: usize,
    mut jobs: mpsc::Receiver<Job<N, P>>,
    registry: Arc<RwLock<Registry<N, P>>>,
    cancel: CancellationToken,
) where
    N: EventKey,
    P: Send + 'static,
{
    loop {
        tokio::select! {
            biased;
            job = jobs.recv() => match job {
                Some(job) => deliver(&registry, job).await,
                None => break,
            },
            _ = cancel.cancelled() => break,
        }
    }

    // Accepted jobs are still delivered after cancellation
    jobs.close();
    while let Some(job) = jobs.recv().await {
        deliver(&registry, job).await;
    }

    debug!(shard, "dispatcher worker stopped");
}

async fn deliver<N, P>(registry: &RwLock<Registry<N, P>>, job: Job<N, P>)
where
    N: EventKey,
    P: Send + 'static,
{
    let listener = registry.read().listener(&job.name);
    match listener {
        Some(listener) => listener.push(job.name, job.payload).await,
        None => warn!(event = %job.name, "no listener for dispatched event"),
    }
}
