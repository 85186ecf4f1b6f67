use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::{LaneId, ProbeQueue};
use super::types::QueuedProbe;
use crate::models::{ProbeGroup, ProbeItem, ProbeTarget};
use crate::settings::{
    ConfigProvider, DEFAULT_HTTP_TIMEOUT_SEC, DEFAULT_PING_REPEAT, DEFAULT_PING_TIMEOUT_SEC,
    DEFAULT_SCHEDULER_INTERVAL_SEC, HTTP_TIMEOUT_SEC, PING_REPEAT, PING_TIMEOUT_SEC,
    SCHEDULER_INTERVAL_SEC,
};
use crate::validation::{MAX_TIMEOUT_MS, MIN_TIMEOUT_MS};

const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MIN_TIMEOUT: Duration = Duration::from_millis(MIN_TIMEOUT_MS);
const MAX_TIMEOUT: Duration = Duration::from_millis(MAX_TIMEOUT_MS);

/// A group bound to its queue lane. The interval is fixed from here on.
#[derive(Debug, Clone)]
pub struct ScheduledGroup {
    pub name: Arc<str>,
    pub interval: Duration,
    pub items: Vec<Arc<ProbeItem>>,
    pub lane: LaneId,
}

/// Monitoring scheduler - one periodic task per group, feeding the probe queue
#[derive(Clone)]
pub struct MonitoringScheduler {
    queue: Arc<ProbeQueue>,
    settings: Arc<dyn ConfigProvider>,
    cancel: CancellationToken,
}

impl MonitoringScheduler {
    pub fn new(
        queue: Arc<ProbeQueue>,
        settings: Arc<dyn ConfigProvider>,
        cancel: CancellationToken,
    ) -> Self {
        Self { queue, settings, cancel }
    }

    /// Give the group its own lane and freeze its interval
    pub fn register_group(&self, group: ProbeGroup) -> ScheduledGroup {
        let interval = group
            .interval_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| {
                self.settings.get_seconds(SCHEDULER_INTERVAL_SEC, DEFAULT_SCHEDULER_INTERVAL_SEC)
            })
            .max(MIN_INTERVAL);

        let lane = self.queue.add_lane(&group.name);

        ScheduledGroup {
            name: Arc::from(group.name),
            interval,
            items: group.items.into_iter().map(Arc::new).collect(),
            lane,
        }
    }

    /// Resolve per-execution parameters for `item` from its own fields or the settings
    fn resolve(&self, group: &ScheduledGroup, item: &Arc<ProbeItem>) -> QueuedProbe {
        let (default_timeout, repeat) = match &item.target {
            ProbeTarget::Icmp(target) => (
                self.settings.get_seconds(PING_TIMEOUT_SEC, DEFAULT_PING_TIMEOUT_SEC),
                target.repeat.unwrap_or_else(|| {
                    self.settings.get_u64(PING_REPEAT, DEFAULT_PING_REPEAT).clamp(1, 100) as u32
                }),
            ),
            ProbeTarget::Http(_) => {
                (self.settings.get_seconds(HTTP_TIMEOUT_SEC, DEFAULT_HTTP_TIMEOUT_SEC), 1)
            }
        };

        // Settings are not validated on save, keep them within the item limits
        let timeout = item.timeout().unwrap_or(default_timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT));
        QueuedProbe::new(group.name.clone(), item.clone(), timeout, repeat)
    }

    /// One tick: enqueue every item of the group in declared order.
    ///
    /// Waits while the group's lane is full. Returns the number of entries
    /// enqueued, which is short only when the queue was closed.
    pub async fn fire(&self, group: &ScheduledGroup) -> usize {
        let mut enqueued = 0;

        for item in &group.items {
            let probe = self.resolve(group, item);
            if let Err(e) = self.queue.enqueue(group.lane, probe).await {
                warn!(group = %group.name, item = %item.name, error = %e, "failed to enqueue probe");
                break;
            }
            enqueued += 1;
        }

        debug!(group = %group.name, enqueued, "group fired");
        enqueued
    }

    /// Schedule a single group for periodic probing. The first tick fires immediately.
    pub fn schedule_group(&self, group: ScheduledGroup) -> JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            info!(
                group = %group.name,
                interval_secs = group.interval.as_secs(),
                items = group.items.len(),
                "scheduling group"
            );

            let mut timer = interval(group.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                tokio::select! {
                    biased;
                    _ = scheduler.cancel.cancelled() => break,
                    _ = timer.tick() => {}
                }

                tokio::select! {
                    biased;
                    _ = scheduler.cancel.cancelled() => break,
                    _ = scheduler.fire(&group) => {}
                }
            }

            debug!(group = %group.name, "scheduler stopped");
        })
    }

    /// Schedule multiple groups
    pub fn schedule_groups(&self, groups: Vec<ScheduledGroup>) -> Vec<JoinHandle<()>> {
        groups.into_iter().map(|group| self.schedule_group(group)).collect()
    }
}
