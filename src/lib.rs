//! # hostresolver
//!
//! A Chromium-inspired asynchronous host resolver for Rust.
//!
//! `hostresolver` turns hostnames into socket addresses the way a browser's
//! network stack does: concurrent requests for the same name share one
//! lookup, lookups are admitted by priority under a concurrency limit, and
//! successful answers are cached until they expire or the network changes.
//!
//! ## Features
//!
//! - **De-duplication**: one job per (hostname, family, flags)
//! - **Prioritized dispatch**: bounded concurrency, reserved slots, queue limits
//! - **Retries**: stalled getaddrinfo attempts are retried in parallel
//! - **Async DNS**: optional hickory client with getaddrinfo fallback
//! - **Host cache**: TTL entries flushed on IP address changes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hostresolver::dns::{HostResolverImpl, RequestInfo, Resolution};
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = HostResolverImpl::builder().build();
//!     let addrs = resolver
//!         .resolve_async(RequestInfo::new("example.com", 443))
//!         .await
//!         .unwrap();
//!     println!("{:?}", addrs);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Addresses, priorities and error codes
//! - [`dns`] - The resolver, its cache, dispatcher and backends

pub mod base;
pub mod dns;
