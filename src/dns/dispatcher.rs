//! Priority-ordered admission control.
//!
//! Chromium mapping: net/base/prioritized_dispatcher.h
//!
//! Holds a bounded number of run slots and queues everything else in
//! per-priority FIFO tiers. The dispatcher never runs anything itself:
//! [`add`](PrioritizedDispatcher::add) and
//! [`on_job_finished`](PrioritizedDispatcher::on_job_finished) tell the
//! owner which job to start.
//!
//! Slots may be reserved for a priority and above. A job of priority `p`
//! may start while fewer than `max_running[p]` jobs are running, where
//! `max_running[p]` is the total of the unreserved slots plus every slot
//! reserved for priorities at or below `p`.

use crate::base::priority::{RequestPriority, NUM_PRIORITIES};
use std::collections::VecDeque;

/// Slot configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Slots that only jobs of this priority or higher may take.
    pub reserved_slots: [usize; NUM_PRIORITIES],
    /// Total number of slots.
    pub total_jobs: usize,
}

impl Limits {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            reserved_slots: [0; NUM_PRIORITIES],
            total_jobs,
        }
    }

    /// Reserve `slots` of the total for `priority` and above.
    pub fn reserve(mut self, priority: RequestPriority, slots: usize) -> Self {
        self.reserved_slots[priority.index()] = slots;
        self
    }
}

/// Position of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueHandle {
    priority: RequestPriority,
    seq: u64,
}

impl QueueHandle {
    pub fn priority(&self) -> RequestPriority {
        self.priority
    }
}

/// What the owner must do with a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was taken; start the job now.
    Started,
    /// The job waits in the queue.
    Queued(QueueHandle),
}

/// Bounded-concurrency, priority-ordered dispatcher over job ids `T`.
#[derive(Debug)]
pub struct PrioritizedDispatcher<T> {
    // Each tier is sorted by seq, oldest at the front.
    queues: [VecDeque<(u64, T)>; NUM_PRIORITIES],
    max_running: [usize; NUM_PRIORITIES],
    limits: Limits,
    num_running: usize,
    num_queued: usize,
    next_seq: u64,
}

impl<T> PrioritizedDispatcher<T> {
    /// Create a dispatcher for `limits`.
    ///
    /// At least one slot always exists, and reservations never grant more
    /// than `total_jobs` running jobs to any priority.
    pub fn new(mut limits: Limits) -> Self {
        if limits.total_jobs == 0 {
            tracing::warn!("dispatcher configured with no slots; using one");
            limits.total_jobs = 1;
        }
        let mut max_running = [0; NUM_PRIORITIES];
        let reserved_total: usize = limits.reserved_slots.iter().sum();
        let mut total = limits.total_jobs.saturating_sub(reserved_total);
        for (i, reserved) in limits.reserved_slots.iter().enumerate() {
            total = total.saturating_add(*reserved);
            max_running[i] = total.min(limits.total_jobs);
        }
        Self {
            queues: Default::default(),
            max_running,
            limits,
            num_running: 0,
            num_queued: 0,
            next_seq: 0,
        }
    }

    /// Run `job` now if its priority has a free slot, otherwise queue it
    /// behind every older job of the same priority.
    pub fn add(&mut self, job: T, priority: RequestPriority) -> Admission {
        if self.can_start(priority) {
            self.num_running += 1;
            return Admission::Started;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        Admission::Queued(self.insert(job, priority, seq))
    }

    /// Remove a queued job. Returns `None` if the handle is stale.
    pub fn cancel(&mut self, handle: QueueHandle) -> Option<T> {
        let queue = &mut self.queues[handle.priority.index()];
        let pos = queue.iter().position(|(seq, _)| *seq == handle.seq)?;
        self.num_queued -= 1;
        queue.remove(pos).map(|(_, job)| job)
    }

    /// Move a queued job to another tier, keeping its original age.
    ///
    /// Returns [`Admission::Started`] if the new priority has a free slot;
    /// the job then left the queue and the owner must start it.
    pub fn change_priority(&mut self, handle: QueueHandle, priority: RequestPriority) -> Admission {
        if handle.priority == priority {
            return Admission::Queued(handle);
        }
        let Some(job) = self.cancel(handle) else {
            return Admission::Queued(handle);
        };
        if self.can_start(priority) {
            self.num_running += 1;
            return Admission::Started;
        }
        Admission::Queued(self.insert(job, priority, handle.seq))
    }

    /// Drop the oldest job of the lowest non-empty tier.
    pub fn evict_oldest_lowest(&mut self) -> Option<T> {
        let queue = self.queues.iter_mut().find(|q| !q.is_empty())?;
        let (_, job) = queue.pop_front()?;
        self.num_queued -= 1;
        Some(job)
    }

    /// Release a running slot and hand back the next job to start, if any.
    pub fn on_job_finished(&mut self) -> Option<T> {
        debug_assert!(self.num_running > 0, "no running job to finish");
        self.num_running = self.num_running.saturating_sub(1);
        let next = self.queues.iter().rposition(|q| !q.is_empty())?;
        if self.num_running >= self.max_running[next] {
            return None;
        }
        let (_, job) = self.queues[next].pop_front()?;
        self.num_queued -= 1;
        self.num_running += 1;
        Some(job)
    }

    pub fn num_running_jobs(&self) -> usize {
        self.num_running
    }

    pub fn num_queued_jobs(&self) -> usize {
        self.num_queued
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    fn can_start(&self, priority: RequestPriority) -> bool {
        self.num_running < self.max_running[priority.index()]
    }

    fn insert(&mut self, job: T, priority: RequestPriority, seq: u64) -> QueueHandle {
        let queue = &mut self.queues[priority.index()];
        let pos = queue.partition_point(|(s, _)| *s < seq);
        queue.insert(pos, (seq, job));
        self.num_queued += 1;
        QueueHandle { priority, seq }
    }
}
