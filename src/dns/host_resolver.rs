//! The host resolver.
//!
//! Chromium mapping: net/base/host_resolver_impl.h
//!
//! # Architecture
//!
//! All resolver state (jobs, dispatcher, cache, live requests) lives in one
//! [`ResolverState`] behind a mutex that is only held for short,
//! non-blocking sections. A driver task owns the receiving end of an event
//! channel: worker-pool replies, retry timers, DNS client replies and
//! network/DNS-config notifications all arrive there and are applied in
//! order. Completion callbacks run on the driver task with the state
//! unlocked, so a callback may resolve, cancel, or drop the resolver.
//!
//! ```text
//! resolve() ──► literal / cache / hosts ──► Complete
//!          └──► find-or-create Job ──► PrioritizedDispatcher ──► Pending
//!
//! driver: ProcTask / DnsTask result ──► Job fan-out ──► callbacks
//! ```

use super::cache::{HostCache, HostCacheKey, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use super::client::DnsClient;
use super::config::{DnsConfig, DnsConfigService};
use super::dispatcher::{Admission, Limits, PrioritizedDispatcher};
use super::dns_task::DnsTask;
use super::gai::{HostResolverProc, SystemHostResolverProc};
use super::job::{DispatchState, Job, JobTask};
use super::message::{Completion, Event, EventSender, JobId};
use super::notifier::{NetworkChange, NetworkChangeNotifier};
use super::proc_task::{
    ProcTask, ProcTaskParams, TaskEnv, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RETRY_FACTOR,
    DEFAULT_UNRESPONSIVE_DELAY,
};
use super::request::{
    validate_hostname, CompletionCallback, RequestHandle, RequestInfo, Resolution,
};
use super::resolve::{Addrs, Name, Resolve, Resolving};
use super::worker::{TokioWorkerPool, WorkerPool};
use crate::base::address::{AddressFamily, AddressList, HostResolverFlags};
use crate::base::neterror::NetError;
use crate::base::priority::{RequestPriority, NUM_PRIORITIES};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Default limit on concurrently running jobs.
pub const DEFAULT_MAX_CONCURRENT_RESOLVES: usize = 6;

/// Queued jobs allowed per running slot by default.
const QUEUED_JOBS_PER_SLOT: usize = 100;

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostResolverConfig {
    /// Jobs allowed to run at once.
    pub max_concurrent_resolves: usize,
    /// Slots only jobs of a given priority or higher may use, indexed by
    /// [`RequestPriority::index`].
    pub reserved_slots: [usize; NUM_PRIORITIES],
    /// Queued jobs allowed across all priorities.
    pub max_queued_jobs: usize,
    /// Host cache entries; 0 disables the cache.
    pub cache_capacity: usize,
    /// Lifetime of a cached success.
    pub cache_ttl: Duration,
    /// Family used for requests that leave it unspecified.
    pub default_address_family: AddressFamily,
    /// Retries after the first getaddrinfo attempt.
    pub max_retry_attempts: u32,
    /// Time before an attempt counts as unresponsive.
    pub unresponsive_delay: Duration,
    /// Growth of the unresponsive delay per retry.
    pub retry_factor: u32,
}

impl Default for HostResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_resolves: DEFAULT_MAX_CONCURRENT_RESOLVES,
            reserved_slots: [0; NUM_PRIORITIES],
            max_queued_jobs: QUEUED_JOBS_PER_SLOT * DEFAULT_MAX_CONCURRENT_RESOLVES,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            default_address_family: AddressFamily::Unspecified,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            unresponsive_delay: DEFAULT_UNRESPONSIVE_DELAY,
            retry_factor: DEFAULT_RETRY_FACTOR,
        }
    }
}

impl HostResolverConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the running job limit. Also resets the queue limit to its
    /// default for that many slots.
    pub fn max_concurrent_resolves(mut self, max: usize) -> Self {
        self.max_concurrent_resolves = max;
        self.max_queued_jobs = QUEUED_JOBS_PER_SLOT * max;
        self
    }

    /// Reserve slots for `priority` and above.
    pub fn reserve_slots(mut self, priority: RequestPriority, slots: usize) -> Self {
        self.reserved_slots[priority.index()] = slots;
        self
    }

    /// Set the queued job limit.
    pub fn max_queued_jobs(mut self, max: usize) -> Self {
        self.max_queued_jobs = max;
        self
    }

    /// Set the cache size; 0 disables caching.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the default address family.
    pub fn default_address_family(mut self, family: AddressFamily) -> Self {
        self.default_address_family = family;
        self
    }

    /// Set the number of retries.
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Set the unresponsive delay.
    pub fn unresponsive_delay(mut self, delay: Duration) -> Self {
        self.unresponsive_delay = delay;
        self
    }

    /// Set the retry factor.
    pub fn retry_factor(mut self, factor: u32) -> Self {
        self.retry_factor = factor;
        self
    }

    /// Dispatcher limits described by this config.
    pub fn limits(&self) -> Limits {
        Limits {
            reserved_slots: self.reserved_slots,
            total_jobs: self.max_concurrent_resolves,
        }
    }

    fn proc_task_params(&self, resolver_proc: Arc<dyn HostResolverProc>) -> ProcTaskParams {
        ProcTaskParams {
            resolver_proc,
            max_retry_attempts: self.max_retry_attempts,
            unresponsive_delay: self.unresponsive_delay,
            retry_factor: self.retry_factor,
        }
    }
}

/// Builder for [`HostResolverImpl`].
#[derive(Default)]
pub struct HostResolverBuilder {
    config: HostResolverConfig,
    resolver_proc: Option<Arc<dyn HostResolverProc>>,
    worker_pool: Option<Arc<dyn WorkerPool>>,
    dns_client: Option<Arc<dyn DnsClient>>,
    network_changes: Option<broadcast::Receiver<NetworkChange>>,
    dns_config: Option<watch::Receiver<Option<DnsConfig>>>,
}

impl HostResolverBuilder {
    pub fn config(mut self, config: HostResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Blocking resolver run on the worker pool. Defaults to getaddrinfo.
    pub fn resolver_proc(mut self, resolver_proc: Arc<dyn HostResolverProc>) -> Self {
        self.resolver_proc = Some(resolver_proc);
        self
    }

    /// Defaults to tokio's blocking pool.
    pub fn worker_pool(mut self, worker_pool: Arc<dyn WorkerPool>) -> Self {
        self.worker_pool = Some(worker_pool);
        self
    }

    pub fn dns_client(mut self, dns_client: Arc<dyn DnsClient>) -> Self {
        self.dns_client = Some(dns_client);
        self
    }

    /// Abort jobs and flush the cache when `notifier` reports an IP change.
    pub fn network_change_notifier(mut self, notifier: &NetworkChangeNotifier) -> Self {
        self.network_changes = Some(notifier.subscribe());
        self
    }

    /// Follow the configuration published by `service`.
    pub fn dns_config_service(mut self, service: &DnsConfigService) -> Self {
        self.dns_config = Some(service.subscribe());
        self
    }

    /// Build the resolver and start its driver task.
    ///
    /// Must be called from within a Tokio runtime. The resolver keeps a
    /// handle to that runtime, so it may be used from any thread afterwards.
    pub fn build(self) -> HostResolverImpl {
        let runtime = Handle::current();
        let config = self.config;
        let resolver_proc = self
            .resolver_proc
            .unwrap_or_else(|| Arc::new(SystemHostResolverProc::new()));
        let worker_pool = self
            .worker_pool
            .unwrap_or_else(|| Arc::new(TokioWorkerPool::with_handle(runtime.clone())));

        let (events, rx) = mpsc::unbounded_channel();
        let mut state = ResolverState {
            cache: (config.cache_capacity > 0).then(|| HostCache::new(config.cache_capacity)),
            cache_ttl: config.cache_ttl,
            dispatcher: PrioritizedDispatcher::new(config.limits()),
            max_queued_jobs: config.max_queued_jobs,
            default_address_family: config.default_address_family,
            jobs: HashMap::new(),
            job_index: HashMap::new(),
            requests: HashMap::new(),
            proc_params: config.proc_task_params(resolver_proc),
            dns_client: None,
            dns_config: None,
            env: TaskEnv {
                events: events.clone(),
                worker_pool,
                runtime: runtime.clone(),
            },
            next_job_id: 0,
            next_request_id: 0,
        };
        state.set_dns_client(self.dns_client);

        let mut dns_config = self.dns_config;
        if let Some(rx) = dns_config.as_mut() {
            let initial = rx.borrow_and_update().clone();
            state.on_dns_config_changed(initial);
        }

        let inner = Arc::new(Inner {
            state: Mutex::new(state),
            events,
        });
        let driver = runtime.spawn(run_driver(
            Arc::downgrade(&inner),
            rx,
            self.network_changes,
            dns_config,
        ))
        .abort_handle();

        tracing::debug!(
            max_concurrent_resolves = config.max_concurrent_resolves,
            max_queued_jobs = config.max_queued_jobs,
            "host resolver created"
        );
        HostResolverImpl { inner, driver }
    }
}

impl fmt::Debug for HostResolverBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostResolverBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Asynchronous host resolver with request de-duplication, prioritized
/// dispatch, retries and a host cache.
///
/// Callbacks run on the resolver's driver task, never inside
/// [`resolve`](Self::resolve). Dropping the resolver drops every pending
/// callback without running it.
///
/// # Example
///
/// ```rust,ignore
/// use hostresolver::dns::{HostResolverImpl, RequestInfo, Resolution};
///
/// let resolver = HostResolverImpl::builder().build();
/// match resolver.resolve(RequestInfo::new("example.com", 443), |result| {
///     println!("resolved: {:?}", result);
/// })? {
///     Resolution::Complete(addrs) => println!("cached: {:?}", addrs),
///     Resolution::Pending(handle) => { /* keep handle to cancel */ }
/// }
/// ```
pub struct HostResolverImpl {
    inner: Arc<Inner>,
    driver: AbortHandle,
}

impl HostResolverImpl {
    pub fn builder() -> HostResolverBuilder {
        HostResolverBuilder::default()
    }

    /// Resolver using getaddrinfo with `config`.
    pub fn new(config: HostResolverConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Resolve `info`.
    ///
    /// IP literals, cache hits and hosts-file entries complete synchronously
    /// with [`Resolution::Complete`] and never run `callback`. Otherwise the
    /// request joins the job for its key and `callback` runs exactly once,
    /// unless the request is cancelled first.
    ///
    /// Fails synchronously with [`NetError::NameNotResolved`] for an empty
    /// or oversized hostname, and with
    /// [`NetError::HostResolverQueueTooLarge`] when the new job is itself
    /// the one evicted from a full queue.
    pub fn resolve<F>(&self, info: RequestInfo, callback: F) -> Result<Resolution, NetError>
    where
        F: FnOnce(Result<AddressList, NetError>) + Send + 'static,
    {
        let mut completions = Vec::new();
        let outcome = self
            .inner
            .lock()
            .start_request(info, Box::new(callback), &mut completions);
        self.inner.post(completions);
        outcome
    }

    /// Answer `info` from IP literals, the cache and the hosts table only.
    pub fn resolve_from_cache(&self, info: &RequestInfo) -> Result<AddressList, NetError> {
        validate_hostname(info.hostname())?;
        let state = self.inner.lock();
        let key = state.key_for(info);
        state
            .resolve_locally(&key, info)?
            .ok_or(NetError::DnsCacheMiss)
    }

    /// Resolve `info` and wait for the result. Dropping the future cancels
    /// the request.
    pub async fn resolve_async(&self, info: RequestInfo) -> Result<AddressList, NetError> {
        let (tx, rx) = oneshot::channel();
        let handle = match self.resolve(info, move |result| {
            let _ = tx.send(result);
        })? {
            Resolution::Complete(addrs) => return Ok(addrs),
            Resolution::Pending(handle) => handle,
        };
        wait_for_completion(Arc::downgrade(&self.inner), handle, rx).await
    }

    /// Cancel a pending request. No-op if it already completed.
    pub fn cancel_request(&self, handle: RequestHandle) {
        self.inner.cancel_request(handle);
    }

    /// Cap the number of queued jobs. Takes effect on the next new job.
    pub fn set_max_queued_jobs(&self, max: usize) {
        self.inner.lock().max_queued_jobs = max;
    }

    /// Family used from now on for requests that leave it unspecified.
    pub fn set_default_address_family(&self, family: AddressFamily) {
        self.inner.lock().default_address_family = family;
    }

    pub fn default_address_family(&self) -> AddressFamily {
        self.inner.lock().default_address_family
    }

    /// Install or remove the DNS client tried before getaddrinfo.
    pub fn set_dns_client(&self, dns_client: Option<Arc<dyn DnsClient>>) {
        self.inner.lock().set_dns_client(dns_client);
    }

    /// Abort every existing job with [`NetError::Aborted`] and flush the
    /// cache. Callbacks run on the driver task.
    pub fn on_ip_address_changed(&self) {
        let completions = self.inner.lock().on_ip_address_changed();
        self.inner.post(completions);
    }

    /// Apply a new DNS configuration.
    pub fn on_dns_config_changed(&self, config: Option<DnsConfig>) {
        self.inner.lock().on_dns_config_changed(config);
    }

    pub fn dns_config(&self) -> Option<DnsConfig> {
        self.inner.lock().dns_config.clone()
    }

    /// Inspect the host cache, `None` when caching is disabled.
    ///
    /// The resolver is locked while `f` runs; `f` must not call back into it.
    pub fn with_host_cache<R>(&self, f: impl FnOnce(Option<&HostCache>) -> R) -> R {
        f(self.inner.lock().cache.as_ref())
    }

    pub fn num_running_jobs(&self) -> usize {
        self.inner.lock().dispatcher.num_running_jobs()
    }

    pub fn num_queued_jobs(&self) -> usize {
        self.inner.lock().dispatcher.num_queued_jobs()
    }

    pub fn num_jobs(&self) -> usize {
        self.inner.lock().jobs.len()
    }
}

impl Resolve for HostResolverImpl {
    fn resolve(&self, name: Name) -> Resolving {
        let (tx, rx) = oneshot::channel();
        let info = RequestInfo::new(name.as_str(), 0);
        let outcome = HostResolverImpl::resolve(self, info, move |result| {
            let _ = tx.send(result);
        });
        let handle = match outcome {
            Ok(Resolution::Complete(addrs)) => {
                return Box::pin(futures::future::ready(Ok(
                    Box::new(addrs.into_iter()) as Addrs
                )))
            }
            Ok(Resolution::Pending(handle)) => handle,
            Err(e) => return Box::pin(futures::future::ready(Err::<Addrs, _>(e))),
        };
        let inner = Arc::downgrade(&self.inner);
        Box::pin(async move {
            let addrs = wait_for_completion(inner, handle, rx).await?;
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

impl Drop for HostResolverImpl {
    fn drop(&mut self) {
        self.driver.abort();
        let (requests, jobs) = {
            let mut state = self.inner.lock();
            state.job_index.clear();
            (mem::take(&mut state.requests), mem::take(&mut state.jobs))
        };
        tracing::debug!(
            pending_requests = requests.len(),
            jobs = jobs.len(),
            "host resolver destroyed"
        );
    }
}

impl fmt::Debug for HostResolverImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("HostResolverImpl")
            .field("jobs", &state.jobs.len())
            .field("requests", &state.requests.len())
            .field("running", &state.dispatcher.num_running_jobs())
            .field("queued", &state.dispatcher.num_queued_jobs())
            .finish_non_exhaustive()
    }
}

struct CancelOnDrop {
    inner: Weak<Inner>,
    handle: Option<RequestHandle>,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let (Some(handle), Some(inner)) = (self.handle.take(), self.inner.upgrade()) {
            inner.cancel_request(handle);
        }
    }
}

async fn wait_for_completion(
    inner: Weak<Inner>,
    handle: RequestHandle,
    rx: oneshot::Receiver<Result<AddressList, NetError>>,
) -> Result<AddressList, NetError> {
    let mut guard = CancelOnDrop {
        inner,
        handle: Some(handle),
    };
    // A dropped sender means the resolver went away first.
    let result = rx.await.unwrap_or(Err(NetError::Aborted));
    guard.handle = None;
    result
}

struct Inner {
    state: Mutex<ResolverState>,
    events: EventSender,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand completions to the driver so callbacks never run on the
    /// caller's stack.
    fn post(&self, completions: Vec<Completion>) {
        if !completions.is_empty() {
            let _ = self.events.send(Event::Deliver(completions));
        }
    }

    fn cancel_request(&self, handle: RequestHandle) {
        // Dropped after unlocking.
        let _record = self.lock().cancel_request(handle);
    }

    /// Run callbacks one at a time. Each request is looked up again right
    /// before its callback, so earlier callbacks may cancel later requests.
    fn deliver(&self, completions: Vec<Completion>) {
        for Completion { request, result } in completions {
            let record = self.lock().requests.remove(&request);
            if let Some(record) = record {
                (record.callback)(result.map(|addrs| addrs.with_port(record.port)));
            }
        }
    }
}

struct RequestRecord {
    port: u16,
    priority: RequestPriority,
    // `None` once the job finished and the result awaits delivery.
    job: Option<JobId>,
    callback: CompletionCallback,
}

struct ResolverState {
    cache: Option<HostCache>,
    cache_ttl: Duration,
    dispatcher: PrioritizedDispatcher<JobId>,
    max_queued_jobs: usize,
    default_address_family: AddressFamily,
    jobs: HashMap<JobId, Job>,
    job_index: HashMap<HostCacheKey, JobId>,
    requests: HashMap<RequestHandle, RequestRecord>,
    proc_params: ProcTaskParams,
    dns_client: Option<Arc<dyn DnsClient>>,
    dns_config: Option<DnsConfig>,
    env: TaskEnv,
    next_job_id: u64,
    next_request_id: u64,
}

impl ResolverState {
    fn key_for(&self, info: &RequestInfo) -> HostCacheKey {
        let family = match info.address_family() {
            AddressFamily::Unspecified => self.default_address_family,
            family => family,
        };
        HostCacheKey::new(info.hostname(), family, info.flags())
    }

    /// Answers that need no job: IP literals, cache hits, hosts entries.
    fn resolve_locally(
        &self,
        key: &HostCacheKey,
        info: &RequestInfo,
    ) -> Result<Option<AddressList>, NetError> {
        if let Ok(ip) = info.hostname().parse::<IpAddr>() {
            if !key.address_family.matches(&ip) {
                return Err(NetError::NameNotResolved);
            }
            let mut addrs = AddressList::from_ips([ip], info.port());
            if key.flags.contains(HostResolverFlags::CANONNAME) {
                addrs.set_canonical_name(info.hostname());
            }
            return Ok(Some(addrs));
        }

        if info.is_cached_response_allowed() {
            if let Some(entry) = self
                .cache
                .as_ref()
                .and_then(|cache| cache.lookup(key, Instant::now()))
            {
                tracing::debug!(host = %key.hostname, "served from host cache");
                return Ok(Some(entry.addresses.clone().with_port(info.port())));
            }
        }

        let hosts_hit = self.dns_config.as_ref().and_then(|config| {
            config
                .hosts
                .lookup(&key.hostname, key.address_family, info.port())
        });
        if let Some(addrs) = hosts_hit {
            tracing::debug!(host = %key.hostname, "served from hosts table");
            return Ok(Some(addrs));
        }
        Ok(None)
    }

    fn start_request(
        &mut self,
        info: RequestInfo,
        callback: CompletionCallback,
        completions: &mut Vec<Completion>,
    ) -> Result<Resolution, NetError> {
        validate_hostname(info.hostname())?;
        let key = self.key_for(&info);
        if let Some(addrs) = self.resolve_locally(&key, &info)? {
            return Ok(Resolution::Complete(addrs));
        }

        let handle = RequestHandle(self.next_request_id);
        self.next_request_id += 1;

        let job_id = match self.job_index.get(&key) {
            Some(&id) => id,
            None => self.create_job(key, info.priority(), completions)?,
        };
        if let Some(job) = self.jobs.get_mut(&job_id) {
            job.add_request(handle, info.priority(), info.is_speculative());
        }
        self.requests.insert(
            handle,
            RequestRecord {
                port: info.port(),
                priority: info.priority(),
                job: Some(job_id),
                callback,
            },
        );
        self.update_job_priority(job_id);

        tracing::debug!(
            host = %info.hostname(),
            port = info.port(),
            priority = ?info.priority(),
            request = handle.0,
            job = job_id.0,
            "request attached to job"
        );
        Ok(Resolution::Pending(handle))
    }

    fn create_job(
        &mut self,
        key: HostCacheKey,
        priority: RequestPriority,
        completions: &mut Vec<Completion>,
    ) -> Result<JobId, NetError> {
        let id = JobId(self.next_job_id);
        self.next_job_id += 1;

        let admission = self.dispatcher.add(id, priority);
        let dispatch = match admission {
            Admission::Started => DispatchState::Running,
            Admission::Queued(handle) => DispatchState::Queued(handle),
        };
        self.job_index.insert(key.clone(), id);
        self.jobs.insert(id, Job::new(id, key, dispatch));
        if admission == Admission::Started {
            self.start_job(id);
        }

        if self.dispatcher.num_queued_jobs() > self.max_queued_jobs {
            if let Some(evicted) = self.dispatcher.evict_oldest_lowest() {
                tracing::warn!(
                    job = evicted.0,
                    max_queued_jobs = self.max_queued_jobs,
                    "host resolver queue full; evicting job"
                );
                if evicted == id {
                    self.remove_job(id);
                    return Err(NetError::HostResolverQueueTooLarge);
                }
                self.complete_job(evicted, Err(NetError::HostResolverQueueTooLarge), completions);
            }
        }
        Ok(id)
    }

    fn start_job(&mut self, id: JobId) {
        let Some(job) = self.jobs.get_mut(&id) else {
            return;
        };
        job.dispatch = DispatchState::Running;

        let dns_client = self
            .dns_client
            .as_ref()
            .filter(|client| {
                client.is_usable() && !job.key.flags.contains(HostResolverFlags::CANONNAME)
            })
            .cloned();
        job.task = Some(match dns_client {
            Some(client) => JobTask::Dns(DnsTask::start(
                client.as_ref(),
                &job.key,
                id,
                &self.env,
            )),
            None => JobTask::Proc(ProcTask::start(
                self.proc_params.clone(),
                job.key.clone(),
                id,
                &self.env,
            )),
        });
        tracing::debug!(host = %job.key.hostname, job = id.0, "job started");
    }

    // Re-file a queued job after its highest request priority changed.
    fn update_job_priority(&mut self, id: JobId) {
        let Some(job) = self.jobs.get_mut(&id) else {
            return;
        };
        let DispatchState::Queued(handle) = job.dispatch else {
            return;
        };
        let priority = job.priority();
        if handle.priority() == priority {
            return;
        }
        match self.dispatcher.change_priority(handle, priority) {
            Admission::Started => self.start_job(id),
            Admission::Queued(handle) => job.dispatch = DispatchState::Queued(handle),
        }
    }

    fn cancel_request(&mut self, handle: RequestHandle) -> Option<RequestRecord> {
        let record = self.requests.remove(&handle)?;
        let Some(job_id) = record.job else {
            return Some(record);
        };
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return Some(record);
        };
        job.remove_request(handle, record.priority);
        tracing::debug!(request = handle.0, job = job_id.0, "request cancelled");

        if job.num_active_requests() > 0 {
            self.update_job_priority(job_id);
            return Some(record);
        }
        let dispatch = job.dispatch;
        match dispatch {
            DispatchState::Queued(queue_handle) => {
                self.dispatcher.cancel(queue_handle);
                self.remove_job(job_id);
                tracing::debug!(job = job_id.0, "queued job aborted without requests");
            }
            // The attempt finishes on its own and releases the slot then.
            DispatchState::Running => {
                tracing::debug!(job = job_id.0, "running job left without requests");
            }
        }
        Some(record)
    }

    fn remove_job(&mut self, id: JobId) -> Option<Job> {
        let job = self.jobs.remove(&id)?;
        if self.job_index.get(&job.key) == Some(&id) {
            self.job_index.remove(&job.key);
        }
        Some(job)
    }

    /// Finish a job: release its slot, cache a success, and queue the
    /// result for every attached request in attach order.
    fn complete_job(
        &mut self,
        id: JobId,
        result: Result<AddressList, NetError>,
        completions: &mut Vec<Completion>,
    ) {
        let Some(job) = self.remove_job(id) else {
            return;
        };
        if job.is_running() {
            if let Some(next) = self.dispatcher.on_job_finished() {
                self.start_job(next);
            }
        }

        match &result {
            Ok(addrs) => {
                if let Some(cache) = self.cache.as_mut() {
                    cache.set(job.key.clone(), addrs.clone(), Instant::now(), self.cache_ttl);
                }
            }
            Err(e) => tracing::debug!(host = %job.key.hostname, error = %e, "job failed"),
        }
        tracing::debug!(
            host = %job.key.hostname,
            job = id.0,
            requests = job.num_active_requests(),
            speculative = !job.had_non_speculative_request(),
            ok = result.is_ok(),
            "job completed"
        );

        for &request in job.requests() {
            if let Some(record) = self.requests.get_mut(&request) {
                record.job = None;
                completions.push(Completion {
                    request,
                    result: result.clone(),
                });
            }
        }
    }

    fn handle_event(&mut self, event: Event) -> Vec<Completion> {
        let mut completions = Vec::new();
        match event {
            Event::ProcAttemptComplete {
                job,
                attempt,
                result,
            } => {
                let outcome = match self.jobs.get_mut(&job).and_then(|j| j.task.as_mut()) {
                    Some(JobTask::Proc(task)) => task.on_attempt_complete(attempt, result),
                    _ => {
                        tracing::trace!(job = job.0, attempt, "discarding result for finished job");
                        None
                    }
                };
                if let Some(result) = outcome {
                    self.complete_job(job, result, &mut completions);
                }
            }
            Event::ProcRetry { job, attempt } => {
                if let Some(JobTask::Proc(task)) =
                    self.jobs.get_mut(&job).and_then(|j| j.task.as_mut())
                {
                    task.on_retry_timer(attempt, &self.env);
                }
            }
            Event::DnsTaskComplete { job, result } => {
                let Some(j) = self.jobs.get_mut(&job) else {
                    tracing::trace!(job = job.0, "discarding DNS result for finished job");
                    return completions;
                };
                if !matches!(j.task, Some(JobTask::Dns(_))) {
                    tracing::trace!(job = job.0, "discarding DNS result for restarted job");
                    return completions;
                }
                match result {
                    Ok(addrs) if !addrs.is_empty() => {
                        self.complete_job(job, Ok(addrs), &mut completions);
                    }
                    other => {
                        tracing::debug!(
                            host = %j.key.hostname,
                            error = ?other.err(),
                            "DNS client lookup failed; falling back to getaddrinfo"
                        );
                        j.task = Some(JobTask::Proc(ProcTask::start(
                            self.proc_params.clone(),
                            j.key.clone(),
                            job,
                            &self.env,
                        )));
                    }
                }
            }
            Event::Deliver(pending) => completions = pending,
        }
        completions
    }

    fn on_ip_address_changed(&mut self) -> Vec<Completion> {
        tracing::info!(
            jobs = self.jobs.len(),
            "IP address changed; aborting jobs and flushing host cache"
        );
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }

        let mut ids: Vec<JobId> = self.jobs.keys().copied().collect();
        ids.sort();
        // Empty the queue first so finishing running jobs starts nothing.
        for id in &ids {
            if let Some(DispatchState::Queued(handle)) = self.jobs.get(id).map(|job| job.dispatch) {
                self.dispatcher.cancel(handle);
            }
        }
        let mut completions = Vec::new();
        for id in ids {
            self.complete_job(id, Err(NetError::Aborted), &mut completions);
        }
        completions
    }

    fn on_dns_config_changed(&mut self, config: Option<DnsConfig>) {
        if self.dns_config == config {
            return;
        }
        tracing::info!(
            valid = config.as_ref().is_some_and(DnsConfig::is_valid),
            "DNS configuration changed"
        );
        self.dns_config = config.clone();
        if let Some(client) = &self.dns_client {
            client.set_config(config);
        }
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }

        for job in self.jobs.values_mut() {
            if matches!(job.task, Some(JobTask::Dns(_))) {
                tracing::debug!(host = %job.key.hostname, "restarting DNS job on getaddrinfo");
                job.task = Some(JobTask::Proc(ProcTask::start(
                    self.proc_params.clone(),
                    job.key.clone(),
                    job.id,
                    &self.env,
                )));
            }
        }
    }

    fn set_dns_client(&mut self, dns_client: Option<Arc<dyn DnsClient>>) {
        if let (Some(client), Some(config)) = (&dns_client, &self.dns_config) {
            client.set_config(Some(config.clone()));
        }
        self.dns_client = dns_client;
    }
}

enum Input {
    Event(Event),
    IpAddressChanged,
    DnsConfigChanged(Option<DnsConfig>),
    Idle,
}

async fn run_driver(
    inner: Weak<Inner>,
    mut events: mpsc::UnboundedReceiver<Event>,
    mut network_changes: Option<broadcast::Receiver<NetworkChange>>,
    mut dns_config: Option<watch::Receiver<Option<DnsConfig>>>,
) {
    loop {
        let input = tokio::select! {
            event = events.recv() => match event {
                Some(event) => Input::Event(event),
                None => break,
            },
            input = next_network_change(&mut network_changes) => input,
            input = next_dns_config(&mut dns_config) => input,
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let completions = {
            let mut state = inner.lock();
            match input {
                Input::Event(event) => state.handle_event(event),
                Input::IpAddressChanged => state.on_ip_address_changed(),
                Input::DnsConfigChanged(config) => {
                    state.on_dns_config_changed(config);
                    Vec::new()
                }
                Input::Idle => Vec::new(),
            }
        };
        inner.deliver(completions);
    }
    tracing::debug!("host resolver driver stopped");
}

async fn next_network_change(rx: &mut Option<broadcast::Receiver<NetworkChange>>) -> Input {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    match receiver.recv().await {
        Ok(NetworkChange::IpAddressChanged) => Input::IpAddressChanged,
        Err(broadcast::error::RecvError::Lagged(missed)) => {
            tracing::warn!(missed, "missed network change notifications");
            Input::IpAddressChanged
        }
        Err(broadcast::error::RecvError::Closed) => {
            *rx = None;
            Input::Idle
        }
    }
}

async fn next_dns_config(rx: &mut Option<watch::Receiver<Option<DnsConfig>>>) -> Input {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    match receiver.changed().await {
        Ok(()) => Input::DnsConfigChanged(receiver.borrow_and_update().clone()),
        Err(_) => {
            *rx = None;
            Input::Idle
        }
    }
}
