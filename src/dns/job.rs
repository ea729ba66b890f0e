//! One in-flight resolution shared by every request for the same key.
//!
//! Chromium mapping: `HostResolverImpl::Job`

use super::cache::HostCacheKey;
use super::dispatcher::QueueHandle;
use super::dns_task::DnsTask;
use super::message::JobId;
use super::proc_task::ProcTask;
use super::request::RequestHandle;
use crate::base::priority::{RequestPriority, NUM_PRIORITIES};

/// Counts attached requests per priority.
#[derive(Debug, Clone, Default)]
pub(crate) struct PriorityTracker {
    counts: [usize; NUM_PRIORITIES],
    total: usize,
}

impl PriorityTracker {
    pub(crate) fn add(&mut self, priority: RequestPriority) {
        self.counts[priority.index()] += 1;
        self.total += 1;
    }

    pub(crate) fn remove(&mut self, priority: RequestPriority) {
        let count = &mut self.counts[priority.index()];
        debug_assert!(*count > 0, "removing untracked priority");
        *count = count.saturating_sub(1);
        self.total = self.total.saturating_sub(1);
    }

    /// Highest priority with a request attached; `Idle` when empty.
    pub(crate) fn highest(&self) -> RequestPriority {
        RequestPriority::ALL
            .iter()
            .rev()
            .find(|p| self.counts[p.index()] > 0)
            .copied()
            .unwrap_or(RequestPriority::Idle)
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchState {
    Queued(QueueHandle),
    Running,
}

#[derive(Debug)]
pub(crate) enum JobTask {
    Proc(ProcTask),
    Dns(DnsTask),
}

#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) id: JobId,
    pub(crate) key: HostCacheKey,
    pub(crate) dispatch: DispatchState,
    pub(crate) task: Option<JobTask>,
    // Attach order; callbacks fire in this order.
    requests: Vec<RequestHandle>,
    priority_tracker: PriorityTracker,
    had_non_speculative_request: bool,
}

impl Job {
    pub(crate) fn new(id: JobId, key: HostCacheKey, dispatch: DispatchState) -> Self {
        Self {
            id,
            key,
            dispatch,
            task: None,
            requests: Vec::new(),
            priority_tracker: PriorityTracker::default(),
            had_non_speculative_request: false,
        }
    }

    pub(crate) fn add_request(
        &mut self,
        request: RequestHandle,
        priority: RequestPriority,
        is_speculative: bool,
    ) {
        self.requests.push(request);
        self.priority_tracker.add(priority);
        self.had_non_speculative_request |= !is_speculative;
    }

    pub(crate) fn remove_request(&mut self, request: RequestHandle, priority: RequestPriority) {
        if let Some(pos) = self.requests.iter().position(|r| *r == request) {
            self.requests.remove(pos);
            self.priority_tracker.remove(priority);
        }
    }

    pub(crate) fn requests(&self) -> &[RequestHandle] {
        &self.requests
    }

    pub(crate) fn num_active_requests(&self) -> usize {
        self.priority_tracker.total()
    }

    pub(crate) fn priority(&self) -> RequestPriority {
        self.priority_tracker.highest()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.dispatch == DispatchState::Running
    }

    pub(crate) fn had_non_speculative_request(&self) -> bool {
        self.had_non_speculative_request
    }
}
