//! Router - assigns work items to workers and tracks what is in flight
//!
//! The router owns every assigned item until it is completed. Per-worker
//! active counts are the core's own bookkeeping; the directory only reports
//! who exists, their capacity and whether they are online.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use sy_common::{
    RejectReason, RouteOutcome, RoutingDecision, SelectionStrategy, WorkItem, WorkKind, WorkerInfo,
};

use crate::queue::QueueStore;
use crate::selection::{selector_for, Candidate, WorkerSelector};

/// An in-flight item and the decision that placed it
#[derive(Debug)]
pub struct Assignment {
    pub item: WorkItem,
    pub decision: RoutingDecision,
}

/// A queued item that was just placed on a worker
#[derive(Debug)]
pub struct Dispatched {
    pub kind: WorkKind,
    pub decision: RoutingDecision,
    pub enqueued_at: Instant,
}

pub struct Router {
    selector: Box<dyn WorkerSelector>,
    /// Active items per worker id
    worker_load: HashMap<String, u32>,
    /// In-flight items by work item id
    assignments: HashMap<String, Assignment>,
}

impl Router {
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self::with_selector(selector_for(strategy))
    }

    pub fn with_selector(selector: Box<dyn WorkerSelector>) -> Self {
        Self {
            selector,
            worker_load: HashMap::new(),
            assignments: HashMap::new(),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.selector.name()
    }

    fn active_for(&self, worker_id: &str) -> u32 {
        self.worker_load.get(worker_id).copied().unwrap_or(0)
    }

    fn candidates<'a>(&self, item: &WorkItem, roster: &'a [WorkerInfo]) -> Vec<Candidate<'a>> {
        let mut candidates: Vec<Candidate<'a>> = roster
            .iter()
            .filter(|w| w.online && w.serves(item.kind) && w.has_skills(&item.skills))
            .map(|w| Candidate {
                worker: w,
                active: self.active_for(&w.id),
            })
            .filter(|c| c.active < c.worker.capacity)
            .collect();
        candidates.sort_by(|a, b| a.worker.id.cmp(&b.worker.id));
        candidates
    }

    fn has_eligible(&self, item: &WorkItem, roster: &[WorkerInfo]) -> bool {
        roster.iter().any(|w| {
            w.online
                && w.serves(item.kind)
                && w.has_skills(&item.skills)
                && self.active_for(&w.id) < w.capacity
        })
    }

    /// Assign to an eligible worker, or hand the item back if there is none.
    pub fn try_assign(
        &mut self,
        item: WorkItem,
        roster: &[WorkerInfo],
        now: DateTime<Utc>,
    ) -> Result<RoutingDecision, WorkItem> {
        let candidates = self.candidates(&item, roster);
        if candidates.is_empty() {
            return Err(item);
        }
        let Some(selection) = self.selector.select(&item, &candidates) else {
            return Err(item);
        };
        let worker_id = candidates[selection.index].worker.id.clone();

        let decision = RoutingDecision {
            work_item_id: item.id.clone(),
            worker_id: worker_id.clone(),
            score: selection.score,
            decided_at: now,
        };
        debug!(
            work_item_id = %item.id,
            worker_id = %worker_id,
            score = selection.score,
            strategy = self.selector.name(),
            "Assigned work item"
        );

        *self.worker_load.entry(worker_id).or_insert(0) += 1;
        self.assignments.insert(
            item.id.clone(),
            Assignment {
                item,
                decision: decision.clone(),
            },
        );
        Ok(decision)
    }

    /// Route directly to a worker if possible, otherwise queue, otherwise reject.
    pub fn route(
        &mut self,
        item: WorkItem,
        roster: &[WorkerInfo],
        queues: &mut QueueStore,
        now: DateTime<Utc>,
    ) -> RouteOutcome {
        match self.try_assign(item, roster, now) {
            Ok(decision) => RouteOutcome::Routed(decision),
            Err(item) => match queues.enqueue(item) {
                Ok(depth) => RouteOutcome::Queued { depth },
                Err(_overflow) => RouteOutcome::Rejected(RejectReason::Overflow),
            },
        }
    }

    /// Move queued items onto workers with spare capacity, highest priority first.
    pub fn dispatch_queued(
        &mut self,
        queues: &mut QueueStore,
        roster: &[WorkerInfo],
        now: DateTime<Utc>,
    ) -> Vec<Dispatched> {
        let mut routed = Vec::new();
        for kind in WorkKind::ALL {
            while let Some(item) = queues.dequeue_next_where(kind, |i| self.has_eligible(i, roster)) {
                let enqueued_at = item.enqueued_at;
                match self.try_assign(item, roster, now) {
                    Ok(decision) => routed.push(Dispatched {
                        kind,
                        decision,
                        enqueued_at,
                    }),
                    Err(item) => {
                        queues.restore(item);
                        break;
                    }
                }
            }
        }
        routed
    }

    /// Remove a completed item, freeing its worker's slot.
    pub fn release(&mut self, work_item_id: &str) -> Option<Assignment> {
        let assignment = self.assignments.remove(work_item_id)?;
        let worker_id = &assignment.decision.worker_id;
        let remaining = match self.worker_load.get_mut(worker_id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Some(*count)
            }
            _ => None,
        };
        match remaining {
            Some(0) => {
                self.worker_load.remove(worker_id);
            }
            Some(_) => {}
            None => {
                debug_assert!(false, "release without matching assignment for {}", worker_id);
                error!(worker_id = %worker_id, "Worker load underflow on release");
            }
        }
        Some(assignment)
    }

    /// Remove every in-flight assignment.
    pub fn drain_assignments(&mut self) -> Vec<Assignment> {
        self.worker_load.clear();
        let mut drained: Vec<Assignment> = self.assignments.drain().map(|(_, a)| a).collect();
        drained.sort_by_key(|a| a.item.enqueued_at);
        drained
    }

    pub fn is_assigned(&self, work_item_id: &str) -> bool {
        self.assignments.contains_key(work_item_id)
    }

    pub fn active_count(&self, kind: WorkKind) -> usize {
        self.assignments.values().filter(|a| a.item.kind == kind).count()
    }

    pub fn active_total(&self) -> usize {
        self.assignments.len()
    }

    /// Total capacity of online workers
    pub fn online_capacity(roster: &[WorkerInfo]) -> u64 {
        roster
            .iter()
            .filter(|w| w.online)
            .map(|w| w.capacity as u64)
            .sum()
    }
}
