//! Platform resolution with retries on the worker pool.
//!
//! Chromium mapping: `HostResolverImpl::ProcTask`
//!
//! Each attempt runs the [`HostResolverProc`] on the worker pool and arms an
//! "unresponsive" timer. If the timer fires first, another attempt starts in
//! parallel; the stalled one keeps running. The first attempt to return
//! wins and every later result is dropped.

use super::cache::HostCacheKey;
use super::gai::HostResolverProc;
use super::message::{Event, EventSender, JobId};
use super::worker::WorkerPool;
use crate::base::address::AddressList;
use crate::base::neterror::NetError;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 4;

/// Default time before an attempt is considered unresponsive.
pub const DEFAULT_UNRESPONSIVE_DELAY: Duration = Duration::from_secs(6);

/// Default growth of the unresponsive delay per attempt.
pub const DEFAULT_RETRY_FACTOR: u32 = 2;

/// Parameters shared by every attempt of a job.
#[derive(Debug, Clone)]
pub struct ProcTaskParams {
    /// Blocking resolution primitive.
    pub resolver_proc: Arc<dyn HostResolverProc>,
    /// Attempts started after the first one, at most.
    pub max_retry_attempts: u32,
    /// Delay before the first retry.
    pub unresponsive_delay: Duration,
    /// Multiplier applied to the delay for each further retry.
    pub retry_factor: u32,
}

impl ProcTaskParams {
    pub fn new(resolver_proc: Arc<dyn HostResolverProc>, max_retry_attempts: u32) -> Self {
        Self {
            resolver_proc,
            max_retry_attempts,
            unresponsive_delay: DEFAULT_UNRESPONSIVE_DELAY,
            retry_factor: DEFAULT_RETRY_FACTOR,
        }
    }

    /// Unresponsive delay armed after 1-based `attempt` starts.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = self
            .retry_factor
            .saturating_pow(attempt.saturating_sub(1));
        self.unresponsive_delay.saturating_mul(factor)
    }
}

/// Everything a task needs to reach the runtime and the driver.
///
/// Tasks spawn through `runtime` rather than the ambient context, since
/// requests may start on threads the runtime does not own.
#[derive(Debug, Clone)]
pub(crate) struct TaskEnv {
    pub(crate) events: EventSender,
    pub(crate) worker_pool: Arc<dyn WorkerPool>,
    pub(crate) runtime: Handle,
}

#[derive(Debug)]
pub(crate) struct ProcTask {
    params: ProcTaskParams,
    key: HostCacheKey,
    job: JobId,
    attempt_number: u32,
    completed_attempt: Option<u32>,
    retry_timer: Option<AbortHandle>,
}

impl ProcTask {
    /// Create the task and dispatch its first attempt.
    pub(crate) fn start(params: ProcTaskParams, key: HostCacheKey, job: JobId, env: &TaskEnv) -> Self {
        let mut task = Self {
            params,
            key,
            job,
            attempt_number: 0,
            completed_attempt: None,
            retry_timer: None,
        };
        task.start_attempt(env);
        task
    }

    fn start_attempt(&mut self, env: &TaskEnv) {
        self.attempt_number += 1;
        let attempt = self.attempt_number;
        let job = self.job;

        tracing::debug!(host = %self.key.hostname, attempt, "starting getaddrinfo attempt");

        let resolver_proc = self.params.resolver_proc.clone();
        let host = self.key.hostname.clone();
        let family = self.key.address_family;
        let flags = self.key.flags;
        let work = env.worker_pool.execute(Box::new(move || {
            resolver_proc.resolve(&host, family, flags)
        }));

        let events = env.events.clone();
        env.runtime.spawn(async move {
            let result = work.await;
            // The driver may be gone; nothing is waiting then.
            let _ = events.send(Event::ProcAttemptComplete {
                job,
                attempt,
                result,
            });
        });

        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        if attempt <= self.params.max_retry_attempts {
            let delay = self.params.retry_delay(attempt);
            let events = env.events.clone();
            let timer = env.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = events.send(Event::ProcRetry { job, attempt });
            });
            self.retry_timer = Some(timer.abort_handle());
        }
    }

    /// The unresponsive timer of `attempt` fired.
    pub(crate) fn on_retry_timer(&mut self, attempt: u32, env: &TaskEnv) {
        if self.completed_attempt.is_some() || attempt != self.attempt_number {
            return;
        }
        tracing::debug!(
            host = %self.key.hostname,
            attempt,
            "getaddrinfo attempt unresponsive; retrying in parallel"
        );
        self.start_attempt(env);
    }

    /// An attempt returned. Yields the job's result for the first one only.
    pub(crate) fn on_attempt_complete(
        &mut self,
        attempt: u32,
        result: Result<AddressList, NetError>,
    ) -> Option<Result<AddressList, NetError>> {
        if let Some(winner) = self.completed_attempt {
            tracing::trace!(
                host = %self.key.hostname,
                attempt,
                winner,
                "discarding late getaddrinfo attempt"
            );
            return None;
        }
        self.completed_attempt = Some(attempt);
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }

        let result = match result {
            Ok(addrs) if addrs.is_empty() => Err(NetError::NameNotResolved),
            other => other,
        };
        match &result {
            Ok(addrs) => tracing::debug!(
                host = %self.key.hostname,
                attempt,
                count = addrs.len(),
                "getaddrinfo attempt succeeded"
            ),
            Err(e) => tracing::debug!(
                host = %self.key.hostname,
                attempt,
                error = %e,
                "getaddrinfo attempt failed"
            ),
        }
        Some(result)
    }

    #[cfg(test)]
    pub(crate) fn attempts_started(&self) -> u32 {
        self.attempt_number
    }
}

impl Drop for ProcTask {
    fn drop(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }
}
