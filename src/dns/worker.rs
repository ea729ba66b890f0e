//! Worker pool for blocking resolution calls.
//!
//! Chromium runs `HostResolverProc` on the WorkerPool and posts the result
//! back to the resolver's thread. Here the pool hands back a future; the
//! job awaits it on the runtime and forwards the result to the driver.

use crate::base::address::AddressList;
use crate::base::neterror::NetError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio::runtime::Handle;

/// A blocking unit of work producing a resolution result.
pub type BlockingResolve = Box<dyn FnOnce() -> Result<AddressList, NetError> + Send + 'static>;

/// Alias for the `Future` type returned by a worker pool.
pub type WorkerResult = Pin<Box<dyn Future<Output = Result<AddressList, NetError>> + Send>>;

/// Executes blocking resolution work off the async runtime.
pub trait WorkerPool: Send + Sync + fmt::Debug {
    /// Start `work` immediately on another thread.
    ///
    /// The work must begin even if the returned future is never polled;
    /// the future only reports its outcome.
    fn execute(&self, work: BlockingResolve) -> WorkerResult;
}

/// Worker pool backed by the blocking threads of a Tokio runtime.
///
/// Work is submitted through the runtime handle captured at construction,
/// so `execute` may be called from threads outside the runtime.
#[derive(Clone, Debug)]
pub struct TokioWorkerPool {
    runtime: Handle,
}

impl TokioWorkerPool {
    /// Uses the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl WorkerPool for TokioWorkerPool {
    fn execute(&self, work: BlockingResolve) -> WorkerResult {
        let task = self.runtime.spawn_blocking(work);
        Box::pin(async move {
            // Handle task join error (cancellation, panic)
            task.await.map_err(|e| {
                tracing::error!(error = %e, "DNS resolution task failed");
                NetError::NameNotResolved
            })?
        })
    }
}
