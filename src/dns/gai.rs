//! Blocking platform resolution via getaddrinfo.
//!
//! [`HostResolverProc`] is the synchronous primitive a job runs on the
//! worker pool. [`SystemHostResolverProc`] is the default implementation,
//! wrapping the standard library's `ToSocketAddrs`.

use crate::base::address::{AddressFamily, AddressList, HostResolverFlags};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use std::fmt;
use std::net::ToSocketAddrs;
use std::sync::Arc;

/// Synchronous host resolution primitive.
///
/// Called on a worker-pool thread; implementations may block. Returned
/// addresses carry port 0.
pub trait HostResolverProc: Send + Sync {
    fn resolve(
        &self,
        host: &str,
        address_family: AddressFamily,
        flags: HostResolverFlags,
    ) -> Result<AddressList, NetError>;
}

/// Blanket implementation for Arc-wrapped procs.
impl<P: HostResolverProc + ?Sized> HostResolverProc for Arc<P> {
    fn resolve(
        &self,
        host: &str,
        address_family: AddressFamily,
        flags: HostResolverFlags,
    ) -> Result<AddressList, NetError> {
        (**self).resolve(host, address_family, flags)
    }
}

/// System resolver using `getaddrinfo`.
///
/// `ToSocketAddrs` offers no hints, so the address family and
/// [`HostResolverFlags::LOOPBACK_ONLY`] are applied by filtering the
/// results. With [`HostResolverFlags::CANONNAME`] the queried host is
/// reported as the canonical name.
#[derive(Clone, Debug, Default)]
pub struct SystemHostResolverProc;

impl SystemHostResolverProc {
    /// Creates a new `SystemHostResolverProc`.
    pub fn new() -> Self {
        Self
    }
}

impl HostResolverProc for SystemHostResolverProc {
    fn resolve(
        &self,
        host: &str,
        address_family: AddressFamily,
        flags: HostResolverFlags,
    ) -> Result<AddressList, NetError> {
        tracing::debug!(host = %host, family = ?address_family, "resolving via getaddrinfo");

        let mut addrs: AddressList = (host, 0u16).to_socket_addrs().dns_context(host)?.collect();
        addrs.retain(|addr| address_family.matches(&addr.ip()));
        if flags.contains(HostResolverFlags::LOOPBACK_ONLY) {
            addrs.retain(|addr| addr.ip().is_loopback());
        }

        if addrs.is_empty() {
            tracing::debug!(host = %host, "getaddrinfo returned no usable addresses");
            return Err(NetError::NameNotResolved);
        }
        if flags.contains(HostResolverFlags::CANONNAME) {
            addrs.set_canonical_name(host);
        }

        tracing::debug!(host = %host, count = addrs.len(), "getaddrinfo resolution complete");
        Ok(addrs)
    }
}

impl fmt::Debug for dyn HostResolverProc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostResolverProc")
    }
}
