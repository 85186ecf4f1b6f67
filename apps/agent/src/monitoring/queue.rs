use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::types::QueuedProbe;
use crate::error::QueueError;

/// Handle of one group's lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneId(usize);

impl LaneId {
    pub fn index(&self) -> usize {
        self.0
    }
}

struct LaneGate {
    name: Arc<str>,
    capacity: usize,
    /// Free slots in the lane
    slots: Semaphore,
    full_events: AtomicU64,
}

struct Lane {
    gate: Arc<LaneGate>,
    entries: VecDeque<QueuedProbe>,
}

struct QueueState {
    lanes: Vec<Lane>,
    /// Lane served first by the next dequeue
    cursor: usize,
}

/// Pending probe executions, one bounded lane per group.
///
/// Producers wait only for room in their own lane. Consumers take entries
/// round-robin across lanes, so a burst in one group never queues ahead of
/// every entry of another group.
pub struct ProbeQueue {
    state: Mutex<QueueState>,
    /// One permit per queued entry
    ready: Semaphore,
    lane_capacity: usize,
    closed: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneStats {
    pub name: String,
    pub depth: usize,
    pub capacity: usize,
    /// Number of enqueues that had to wait for room
    pub full_events: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub lanes: Vec<LaneStats>,
}

impl QueueStats {
    pub fn depth(&self) -> usize {
        self.lanes.iter().map(|lane| lane.depth).sum()
    }

    pub fn full_events(&self) -> u64 {
        self.lanes.iter().map(|lane| lane.full_events).sum()
    }
}

impl ProbeQueue {
    pub fn new(lane_capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState { lanes: Vec::new(), cursor: 0 }),
            ready: Semaphore::new(0),
            lane_capacity: lane_capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn add_lane(&self, name: &str) -> LaneId {
        let mut state = self.state.lock();
        let gate = LaneGate {
            name: Arc::from(name),
            capacity: self.lane_capacity,
            slots: Semaphore::new(self.lane_capacity),
            full_events: AtomicU64::new(0),
        };
        state.lanes.push(Lane { gate: Arc::new(gate), entries: VecDeque::new() });
        LaneId(state.lanes.len() - 1)
    }

    /// Add an entry to `lane`, waiting while the lane is full
    pub async fn enqueue(&self, lane: LaneId, probe: QueuedProbe) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        let gate = self
            .state
            .lock()
            .lanes
            .get(lane.0)
            .map(|l| l.gate.clone())
            .ok_or(QueueError::UnknownLane(lane.0))?;

        let permit = match gate.slots.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(QueueError::Closed),
            Err(TryAcquireError::NoPermits) => {
                let waits = gate.full_events.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    group = %gate.name,
                    capacity = gate.capacity,
                    full_events = waits,
                    "probe queue lane is full, scheduler waiting for room"
                );
                gate.slots.acquire().await.map_err(|_| QueueError::Closed)?
            }
        };
        permit.forget();

        self.state.lock().lanes[lane.0].entries.push_back(probe);
        self.ready.add_permits(1);
        Ok(())
    }

    /// Next entry, waiting while the queue is empty.
    ///
    /// After `cancel` fires, queued entries are still handed out until none are
    /// left, then `None` is returned.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<QueuedProbe> {
        loop {
            let permit = tokio::select! {
                biased;
                permit = self.ready.acquire() => permit.ok()?,
                _ = cancel.cancelled() => self.ready.try_acquire().ok()?,
            };
            permit.forget();

            if let Some(probe) = self.pop() {
                return Some(probe);
            }
        }
    }

    fn pop(&self) -> Option<QueuedProbe> {
        let mut state = self.state.lock();
        let count = state.lanes.len();

        for offset in 0..count {
            let index = (state.cursor + offset) % count;
            let lane = &mut state.lanes[index];
            if let Some(probe) = lane.entries.pop_front() {
                lane.gate.slots.add_permits(1);
                state.cursor = (index + 1) % count;
                return Some(probe);
            }
        }

        None
    }

    /// Reject further enqueues and wake producers waiting for room
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for lane in &self.state.lock().lanes {
            lane.gate.slots.close();
        }
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            lanes: state
                .lanes
                .iter()
                .map(|lane| LaneStats {
                    name: lane.gate.name.to_string(),
                    depth: lane.entries.len(),
                    capacity: lane.gate.capacity,
                    full_events: lane.gate.full_events.load(Ordering::Relaxed),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().lanes.iter().map(|lane| lane.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
