//! Messages delivered to the resolver's driver task.

use super::request::RequestHandle;
use crate::base::address::AddressList;
use crate::base::neterror::NetError;
use tokio::sync::mpsc;

/// Identifies one job for the lifetime of the resolver. Never reused, so a
/// late message for a finished job cannot reach a newer job for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct JobId(pub(crate) u64);

/// A result owed to one request.
#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) request: RequestHandle,
    pub(crate) result: Result<AddressList, NetError>,
}

#[derive(Debug)]
pub(crate) enum Event {
    /// A worker-pool attempt returned.
    ProcAttemptComplete {
        job: JobId,
        attempt: u32,
        result: Result<AddressList, NetError>,
    },
    /// The unresponsive timer of an attempt fired.
    ProcRetry { job: JobId, attempt: u32 },
    /// The DNS client answered.
    DnsTaskComplete {
        job: JobId,
        result: Result<AddressList, NetError>,
    },
    /// Run callbacks outside the caller's stack.
    Deliver(Vec<Completion>),
}

pub(crate) type EventSender = mpsc::UnboundedSender<Event>;
