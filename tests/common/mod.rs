//! Shared helpers for resolver integration tests.

#![allow(dead_code)]

use hostresolver::base::address::{AddressFamily, AddressList, HostResolverFlags};
use hostresolver::base::neterror::NetError;
use hostresolver::dns::mock::RuleBasedHostResolverProc;
use hostresolver::dns::{BlockingResolve, HostResolverProc, WorkerPool, WorkerResult};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Worker pool that only runs work when the test says so.
///
/// Work is kept in submission order, which is the order jobs were started.
#[derive(Debug, Default)]
pub struct ManualWorkerPool {
    pending: Mutex<VecDeque<Pending>>,
}

struct Pending {
    work: BlockingResolve,
    reply: oneshot::Sender<Result<AddressList, NetError>>,
}

impl std::fmt::Debug for Pending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pending")
    }
}

impl ManualWorkerPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn num_pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Run the work submitted `index`-th among those still pending.
    pub fn run(&self, index: usize) {
        let pending = self.pending.lock().unwrap().remove(index);
        let Pending { work, reply } = pending.expect("no such pending work");
        let _ = reply.send(work());
    }

    pub fn run_next(&self) {
        self.run(0);
    }

    /// Run everything pending, including work submitted while draining.
    pub fn run_all(&self) {
        while self.num_pending() > 0 {
            self.run_next();
        }
    }
}

impl WorkerPool for ManualWorkerPool {
    fn execute(&self, work: BlockingResolve) -> WorkerResult {
        let (reply, rx) = oneshot::channel();
        self.pending.lock().unwrap().push_back(Pending { work, reply });
        Box::pin(async move { rx.await.unwrap_or(Err(NetError::Aborted)) })
    }
}

/// Records every hostname it is asked for before delegating.
#[derive(Debug)]
pub struct CapturingProc {
    inner: Box<dyn HostResolverProc>,
    captured: Mutex<Vec<(String, AddressFamily)>>,
}

impl CapturingProc {
    /// Resolves everything to 127.0.0.1 unless rules say otherwise.
    pub fn new() -> Arc<Self> {
        Self::wrapping(RuleBasedHostResolverProc::catch_all())
    }

    pub fn wrapping(inner: impl HostResolverProc + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner: Box::new(inner),
            captured: Mutex::new(Vec::new()),
        })
    }

    pub fn hosts(&self) -> Vec<String> {
        self.captured
            .lock()
            .unwrap()
            .iter()
            .map(|(host, _)| host.clone())
            .collect()
    }

    pub fn captured(&self) -> Vec<(String, AddressFamily)> {
        self.captured.lock().unwrap().clone()
    }
}

impl HostResolverProc for CapturingProc {
    fn resolve(
        &self,
        host: &str,
        address_family: AddressFamily,
        flags: HostResolverFlags,
    ) -> Result<AddressList, NetError> {
        self.captured
            .lock()
            .unwrap()
            .push((host.to_string(), address_family));
        self.inner.resolve(host, address_family, flags)
    }
}

/// Answers `192.x.y.z`: x is the hostname length, y its first byte and z
/// 1 for IPv4 lookups, 2 for IPv6 and 0 otherwise.
#[derive(Debug, Default)]
pub struct EchoingProc;

impl HostResolverProc for EchoingProc {
    fn resolve(
        &self,
        host: &str,
        address_family: AddressFamily,
        _flags: HostResolverFlags,
    ) -> Result<AddressList, NetError> {
        let family = match address_family {
            AddressFamily::Unspecified => 0,
            AddressFamily::Ipv4 => 1,
            AddressFamily::Ipv6 => 2,
        };
        let first = host.bytes().next().unwrap_or(0);
        let ip = Ipv4Addr::new(192, host.len() as u8, first, family);
        Ok(AddressList::from_ips([IpAddr::V4(ip)], 0))
    }
}

/// Collects tagged callback results in completion order.
pub struct Callbacks {
    tx: mpsc::UnboundedSender<(&'static str, Result<AddressList, NetError>)>,
    rx: mpsc::UnboundedReceiver<(&'static str, Result<AddressList, NetError>)>,
}

impl Callbacks {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn callback(
        &self,
        tag: &'static str,
    ) -> impl FnOnce(Result<AddressList, NetError>) + Send + 'static {
        let tx = self.tx.clone();
        move |result| {
            let _ = tx.send((tag, result));
        }
    }

    pub async fn next(&mut self) -> (&'static str, Result<AddressList, NetError>) {
        tokio::time::timeout(TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for a callback")
            .expect("callback channel closed")
    }

    /// Tags of the next `n` callbacks.
    pub async fn next_tags(&mut self, n: usize) -> Vec<&'static str> {
        let mut tags = Vec::with_capacity(n);
        for _ in 0..n {
            tags.push(self.next().await.0);
        }
        tags
    }

    /// Let the driver settle, then report whether any callback is queued.
    pub async fn is_idle(&mut self) -> bool {
        settle().await;
        self.rx.try_recv().is_err()
    }
}

/// Yield long enough for the driver and forwarding tasks to run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Poll `condition` until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never became true");
}

pub fn ip(list: &AddressList) -> String {
    list.first().map(|addr| addr.ip().to_string()).unwrap_or_default()
}
