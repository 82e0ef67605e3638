//! Parallel invocation driver
//!
//! Runs independent lanes of tool calls concurrently and gathers one
//! [`LaneOutcome`] per lane. Both scheduling models are the same primitive:
//! a set of worker slots, bounded by a semaphore in pool mode, with every
//! lane spawned as its own task. A lane that errors, times out or panics is
//! recorded as failed; its siblings keep running.
//!
//! Each running lane holds a distinct worker slot of its runner and uses
//! that slot's [`OwnerKey`], so two concurrent lanes never share a pooled
//! connection.

pub mod lanes;

pub use lanes::{repository_lanes, Lane};

use crate::gateway::ToolInvoker;
use crate::types::{OwnerKey, ToolResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// How lanes are mapped onto workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduling {
    /// One worker per lane; every lane starts immediately
    ThreadPerLane,
    /// A fixed number of workers; extra lanes wait for a free worker
    WorkerPool {
        /// Worker count
        workers: usize,
    },
}

impl FromStr for Scheduling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threads" | "thread-per-lane" => Ok(Scheduling::ThreadPerLane),
            "pool" | "worker-pool" => Ok(Scheduling::WorkerPool { workers: 4 }),
            other => Err(format!("unknown scheduling '{other}', expected pool or threads")),
        }
    }
}

/// Result of one lane
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LaneOutcome {
    /// Every call succeeded; results in call order
    #[serde(rename = "ok")]
    Completed(Vec<ToolResult>),
    /// The lane stopped at its first failure
    #[serde(rename = "error")]
    Failed(String),
}

impl LaneOutcome {
    /// Whether the lane completed
    pub fn is_ok(&self) -> bool {
        matches!(self, LaneOutcome::Completed(_))
    }

    /// All results of the lane flattened into records
    pub fn records(&self) -> Vec<Value> {
        match self {
            LaneOutcome::Completed(results) => results
                .iter()
                .cloned()
                .flat_map(ToolResult::into_records)
                .collect(),
            LaneOutcome::Failed(_) => Vec::new(),
        }
    }
}

/// Every lane's outcome, keyed by lane name
#[derive(Debug, Clone, Serialize)]
pub struct ParallelRun {
    /// Outcomes keyed by lane name
    #[serde(flatten)]
    pub outcomes: BTreeMap<String, LaneOutcome>,
    /// Wall time of the whole run
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ParallelRun {
    /// Number of lanes
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the run had no lanes
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Outcome of one lane
    pub fn get(&self, lane: &str) -> Option<&LaneOutcome> {
        self.outcomes.get(lane)
    }

    /// Names of the lanes that failed
    pub fn failed_lanes(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_ok())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Worker slot ids of one runner, shared by all of its runs.
///
/// In pool mode a semaphore bounds how many slots are taken at once; a slot
/// id is only handed out under a permit and goes back before the permit, so
/// ids stay below the worker count. Thread-per-lane hands out as many ids as
/// there are running lanes.
#[derive(Debug)]
struct WorkerSlots {
    permits: Option<Arc<Semaphore>>,
    ids: Mutex<SlotIds>,
}

#[derive(Debug, Default)]
struct SlotIds {
    free: Vec<usize>,
    next: usize,
}

impl WorkerSlots {
    fn new(scheduling: Scheduling) -> Self {
        let permits = match scheduling {
            Scheduling::ThreadPerLane => None,
            Scheduling::WorkerPool { workers } => Some(Arc::new(Semaphore::new(workers.max(1)))),
        };
        Self {
            permits,
            ids: Mutex::new(SlotIds::default()),
        }
    }

    /// Wait for a worker, then take the lowest free slot id
    async fn take(self: &Arc<Self>) -> Option<SlotGuard> {
        let permit = match &self.permits {
            Some(permits) => Some(Arc::clone(permits).acquire_owned().await.ok()?),
            None => None,
        };

        let slot = {
            let mut ids = self.ids.lock().ok()?;
            ids.free.sort_unstable_by(|a, b| b.cmp(a));
            match ids.free.pop() {
                Some(slot) => slot,
                None => {
                    let slot = ids.next;
                    ids.next += 1;
                    slot
                }
            }
        };

        Some(SlotGuard {
            slots: Arc::clone(self),
            slot,
            _permit: permit,
        })
    }
}

/// A taken slot id; returned on drop, including when the lane panics
struct SlotGuard {
    slots: Arc<WorkerSlots>,
    slot: usize,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut ids) = self.slots.ids.lock() {
            ids.free.push(self.slot);
        }
    }
}

static NEXT_RUNNER_ID: AtomicUsize = AtomicUsize::new(0);

/// Runs lanes through a [`ToolInvoker`].
///
/// Each runner has its own id, and its lanes run under
/// [`OwnerKey::worker`] keys made from that id and a worker slot. Slots are
/// shared by every run of the runner and its clones, so lanes never share an
/// owner, even across overlapping runs or runners on one gateway.
#[derive(Clone)]
pub struct LaneRunner {
    invoker: Arc<dyn ToolInvoker>,
    scheduling: Scheduling,
    lane_timeout: Duration,
    id: usize,
    slots: Arc<WorkerSlots>,
}

impl std::fmt::Debug for LaneRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneRunner")
            .field("id", &self.id)
            .field("scheduling", &self.scheduling)
            .field("lane_timeout", &self.lane_timeout)
            .finish_non_exhaustive()
    }
}

impl LaneRunner {
    /// Runner with a bound on each lane's total time
    pub fn new(invoker: Arc<dyn ToolInvoker>, scheduling: Scheduling, lane_timeout: Duration) -> Self {
        Self {
            invoker,
            scheduling,
            lane_timeout,
            id: NEXT_RUNNER_ID.fetch_add(1, Ordering::Relaxed),
            slots: Arc::new(WorkerSlots::new(scheduling)),
        }
    }

    /// Identifier used in this runner's owner keys
    pub fn id(&self) -> usize {
        self.id
    }

    /// Run every lane and wait until each one has an outcome.
    ///
    /// Lanes with duplicate names are kept apart by a `#n` suffix, so the
    /// result always has one entry per lane.
    pub async fn run(&self, lanes: Vec<Lane>) -> ParallelRun {
        let started = Instant::now();
        let lane_count = lanes.len();

        let mut handles = Vec::with_capacity(lane_count);
        for lane in lanes {
            let invoker = Arc::clone(&self.invoker);
            let slots = Arc::clone(&self.slots);
            let runner = self.id;
            let bound = self.lane_timeout;
            let name = lane.name.clone();

            let handle = tokio::spawn(async move {
                let Some(slot) = slots.take().await else {
                    return LaneOutcome::Failed("no worker available".to_string());
                };
                let owner = OwnerKey::worker(runner, slot.slot);
                tracing::debug!("Lane '{}' running on {}", lane.name, owner);

                let outcome =
                    match tokio::time::timeout(bound, lane.run(invoker.as_ref(), &owner)).await {
                        Ok(outcome) => outcome,
                        Err(_) => LaneOutcome::Failed(format!("lane timed out after {bound:?}")),
                    };

                drop(slot);
                outcome
            });
            handles.push((name, handle));
        }

        let mut outcomes = BTreeMap::new();
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => LaneOutcome::Failed("lane panicked".to_string()),
                Err(e) => LaneOutcome::Failed(format!("lane was cancelled: {e}")),
            };
            if let LaneOutcome::Failed(reason) = &outcome {
                tracing::warn!("Lane '{}' failed: {}", name, reason);
            }
            let key = unique_name(&outcomes, name);
            outcomes.insert(key, outcome);
        }

        let elapsed = started.elapsed();
        tracing::info!(
            "Parallel run of {} lane(s) finished in {:?}",
            lane_count,
            elapsed
        );
        ParallelRun { outcomes, elapsed }
    }
}

fn unique_name(existing: &BTreeMap<String, LaneOutcome>, name: String) -> String {
    if !existing.contains_key(&name) {
        return name;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{name}#{n}");
        if !existing.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
