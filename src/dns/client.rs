//! Asynchronous DNS client interface.
//!
//! Chromium mapping: net/dns/dns_client.h
//!
//! A resolver job tries the DNS client first when one is installed and holds
//! a valid [`DnsConfig`]; any failure falls back to the platform resolver.

use super::config::DnsConfig;
use crate::base::address::{AddressFamily, AddressList};
use crate::base::neterror::NetError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Alias for the `Future` type returned by a DNS client.
pub type DnsResolving = Pin<Box<dyn Future<Output = Result<AddressList, NetError>> + Send>>;

/// Wire-format DNS client.
pub trait DnsClient: Send + Sync + fmt::Debug {
    /// Replace the configuration; `None` disables the client.
    fn set_config(&self, config: Option<DnsConfig>);

    /// Current configuration.
    fn config(&self) -> Option<DnsConfig>;

    /// Look up `hostname`. Returned addresses carry port 0.
    fn resolve(&self, hostname: &str, address_family: AddressFamily) -> DnsResolving;

    /// Whether jobs should try this client at all.
    fn is_usable(&self) -> bool {
        self.config().is_some_and(|config| config.is_valid())
    }
}

/// Blanket implementation for Arc-wrapped clients.
impl<C: DnsClient + ?Sized> DnsClient for Arc<C> {
    fn set_config(&self, config: Option<DnsConfig>) {
        (**self).set_config(config)
    }

    fn config(&self) -> Option<DnsConfig> {
        (**self).config()
    }

    fn resolve(&self, hostname: &str, address_family: AddressFamily) -> DnsResolving {
        (**self).resolve(hostname, address_family)
    }

    fn is_usable(&self) -> bool {
        (**self).is_usable()
    }
}
