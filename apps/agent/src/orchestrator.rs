//! Agent orchestration - wires every component and owns their lifecycle
//!
//! The agent:
//! - Builds the settings service and binds it to the event dispatcher
//! - Gives every probe group its own queue lane and scheduler task
//! - Runs the worker pool that executes and evaluates probes
//! - Shuts the pipeline down in order: schedulers, workers, dispatcher
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::events::AgentDispatcher;
use crate::monitoring::{
    MonitoringScheduler, ProbeExecutor, ProbeQueue, QueueStats, ScheduledGroup, WorkerContext,
    WorkerPool,
};
use crate::settings::{Settings, SettingsRepo, register_settings_listener};
use crate::validation::validate_config;

/// Main orchestrator of the probing agent
pub struct Agent {
    config: Arc<AgentConfig>,
    settings: Arc<Settings>,
    dispatcher: Arc<AgentDispatcher>,
    queue: Arc<ProbeQueue>,
    executor: ProbeExecutor,
    scheduler: MonitoringScheduler,
    /// Registered groups, handed to the scheduler on start
    groups: Vec<ScheduledGroup>,
    schedule_cancel: CancellationToken,
    listener_cancel: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
    listener_handles: Vec<JoinHandle<()>>,
    workers: Option<WorkerPool>,
    started: bool,
}

impl Agent {
    /// Create an agent probing the real network. Must run inside a tokio runtime.
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let executor = ProbeExecutor::new()?;
        Self::with_executor(config, executor)
    }

    /// Create an agent with a custom prober
    pub fn with_executor(config: AgentConfig, executor: ProbeExecutor) -> Result<Self, AgentError> {
        validate_config(&config)?;
        let config = Arc::new(config);

        let repo = Arc::new(SettingsRepo::from_values(config.settings_values()));
        let settings = Arc::new(Settings::new(repo, config.agent.settings_ttl()));
        let dispatcher = Arc::new(AgentDispatcher::new());

        // A conflict here is a wiring bug, the agent must not start with it
        let listener_cancel = CancellationToken::new();
        let settings_handle =
            register_settings_listener(&dispatcher, settings.clone(), listener_cancel.clone())?;

        let queue = Arc::new(ProbeQueue::new(config.agent.queue_capacity));
        let schedule_cancel = CancellationToken::new();
        let scheduler =
            MonitoringScheduler::new(queue.clone(), settings.clone(), schedule_cancel.clone());

        let groups: Vec<ScheduledGroup> =
            config.groups.iter().cloned().map(|group| scheduler.register_group(group)).collect();

        for group in &groups {
            debug!(
                group = %group.name,
                interval_secs = group.interval.as_secs(),
                items = group.items.len(),
                "group registered"
            );
        }

        Ok(Self {
            config,
            settings,
            dispatcher,
            queue,
            executor,
            scheduler,
            groups,
            schedule_cancel,
            listener_cancel,
            task_handles: Vec::new(),
            listener_handles: vec![settings_handle],
            workers: None,
            started: false,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Dispatcher of the agent; bind result consumers here before `start`
    pub fn dispatcher(&self) -> &Arc<AgentDispatcher> {
        &self.dispatcher
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Spawn the worker pool and one scheduler task per group
    pub fn start(&mut self) -> Result<(), AgentError> {
        if self.started {
            return Err(AgentError::AlreadyStarted);
        }
        self.started = true;

        let worker_count = self.config.agent.worker_count();
        self.workers = Some(WorkerPool::spawn(
            worker_count,
            WorkerContext {
                queue: self.queue.clone(),
                executor: self.executor.clone(),
                dispatcher: self.dispatcher.clone(),
            },
        ));

        let groups = std::mem::take(&mut self.groups);
        info!(groups = groups.len(), workers = worker_count, "starting uppe agent");
        self.task_handles = self.scheduler.schedule_groups(groups);

        Ok(())
    }

    /// Stop the agent.
    ///
    /// Schedulers stop first, then workers drain the queue for at most the
    /// configured drain timeout before in-flight probes are aborted. Returns
    /// whether the queue was drained in time.
    pub async fn shutdown(mut self) -> bool {
        info!("shutting down uppe agent");

        self.schedule_cancel.cancel();
        for handle in self.task_handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler task failed");
            }
        }
        self.queue.close();

        let drained = match self.workers.take() {
            Some(workers) => workers.drain(self.config.agent.drain_timeout()).await,
            None => true,
        };

        let stats = self.queue.stats();
        if stats.full_events() > 0 {
            info!(full_events = stats.full_events(), "queue backpressure was hit during this run");
        }

        self.dispatcher.shutdown().await;
        self.listener_cancel.cancel();
        for handle in self.listener_handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "listener task failed");
            }
        }

        info!(drained, "uppe agent stopped");
        drained
    }
}
