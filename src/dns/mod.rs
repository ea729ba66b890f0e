//! Host resolution.
//!
//! Provides an asynchronous host resolver with:
//! - Request de-duplication (one job per hostname, family and flags)
//! - Priority-ordered, bounded job dispatch with optional reserved slots
//! - getaddrinfo on a worker pool with parallel retries of stalled attempts
//! - An optional async DNS client (hickory) with fallback to getaddrinfo
//! - A TTL host cache flushed on network changes
//!
//! # Architecture
//!
//! [`HostResolverImpl`] is the entry point. Each request is answered
//! synchronously from an IP literal, the [`HostCache`] or the hosts table
//! when possible; otherwise it attaches to a job admitted by a
//! [`PrioritizedDispatcher`]. Jobs run a [`HostResolverProc`] on a
//! [`WorkerPool`], or a [`DnsClient`] first when one is usable.
//!
//! # Example
//!
//! ```rust,ignore
//! use hostresolver::dns::{HostResolverImpl, RequestInfo};
//!
//! let resolver = HostResolverImpl::builder().build();
//! let addrs = resolver.resolve_async(RequestInfo::new("example.com", 443)).await?;
//! for addr in &addrs {
//!     println!("Resolved: {}", addr);
//! }
//! ```

mod cache;
mod client;
mod config;
mod dispatcher;
mod dns_task;
mod gai;
mod hickory;
mod host_resolver;
mod job;
mod message;
pub mod mock;
mod notifier;
mod proc_task;
mod request;
mod resolve;
mod worker;

pub use cache::{HostCache, HostCacheEntry, HostCacheKey, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
pub use client::{DnsClient, DnsResolving};
pub use config::{DnsConfig, DnsConfigService, DnsHosts};
pub use dispatcher::{Admission, Limits, PrioritizedDispatcher, QueueHandle};
pub use gai::{HostResolverProc, SystemHostResolverProc};
pub use hickory::HickoryDnsClient;
pub use host_resolver::{
    HostResolverBuilder, HostResolverConfig, HostResolverImpl, DEFAULT_MAX_CONCURRENT_RESOLVES,
};
pub use notifier::{NetworkChange, NetworkChangeNotifier};
pub use proc_task::{
    ProcTaskParams, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RETRY_FACTOR, DEFAULT_UNRESPONSIVE_DELAY,
};
pub use request::{CompletionCallback, RequestHandle, RequestInfo, Resolution, MAX_HOSTNAME_LEN};
pub use resolve::{Addrs, Name, Resolve, Resolving};
pub use worker::{BlockingResolve, TokioWorkerPool, WorkerPool, WorkerResult};
