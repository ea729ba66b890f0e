//! Address families, resolver flags and resolved address lists.
//!
//! Chromium mapping: net/base/address_family.h, net/base/address_list.h

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Address family a lookup is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressFamily {
    /// Either IPv4 or IPv6.
    #[default]
    Unspecified,
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// Family of a concrete address.
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Whether `ip` is acceptable for this family.
    pub fn matches(self, ip: &IpAddr) -> bool {
        self == AddressFamily::Unspecified || self == Self::of(ip)
    }
}

bitflags! {
    /// Flags passed down to the platform resolver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HostResolverFlags: u32 {
        /// Ask for the canonical name of the host.
        const CANONNAME = 1 << 0;
        /// Only loopback addresses are acceptable.
        const LOOPBACK_ONLY = 1 << 1;
    }
}

/// Ordered list of resolved socket addresses.
///
/// All entries share one port; [`AddressList::with_port`] rewrites it when a
/// cached or de-duplicated result is handed to a request for another port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressList {
    addrs: Vec<SocketAddr>,
    canonical_name: Option<String>,
}

impl AddressList {
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self {
            addrs,
            canonical_name: None,
        }
    }

    /// Build a list from bare IPs sharing `port`.
    pub fn from_ips<I: IntoIterator<Item = IpAddr>>(ips: I, port: u16) -> Self {
        Self::new(ips.into_iter().map(|ip| SocketAddr::new(ip, port)).collect())
    }

    /// Parse an IP literal (no brackets) into a single-entry list.
    ///
    /// Returns `None` for anything that needs an actual lookup.
    pub fn try_parse(host: &str, port: u16) -> Option<Self> {
        host.parse::<IpAddr>()
            .ok()
            .map(|ip| Self::from_ips([ip], port))
    }

    /// Copy of this list with every entry moved to `port`.
    pub fn with_port(mut self, port: u16) -> Self {
        for addr in &mut self.addrs {
            addr.set_port(port);
        }
        self
    }

    /// Keep only the entries accepted by `keep`.
    pub fn retain<F: FnMut(&SocketAddr) -> bool>(&mut self, keep: F) {
        self.addrs.retain(keep);
    }

    /// Port of the first entry, if any.
    pub fn port(&self) -> Option<u16> {
        self.addrs.first().map(SocketAddr::port)
    }

    pub fn first(&self) -> Option<&SocketAddr> {
        self.addrs.first()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SocketAddr> {
        self.addrs.iter()
    }

    pub fn canonical_name(&self) -> Option<&str> {
        self.canonical_name.as_deref()
    }

    pub fn set_canonical_name(&mut self, name: impl Into<String>) {
        self.canonical_name = Some(name.into());
    }

    pub fn push(&mut self, addr: SocketAddr) {
        self.addrs.push(addr);
    }
}

impl IntoIterator for AddressList {
    type Item = SocketAddr;
    type IntoIter = std::vec::IntoIter<SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addrs.into_iter()
    }
}

impl<'a> IntoIterator for &'a AddressList {
    type Item = &'a SocketAddr;
    type IntoIter = std::slice::Iter<'a, SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addrs.iter()
    }
}

impl FromIterator<SocketAddr> for AddressList {
    fn from_iter<I: IntoIterator<Item = SocketAddr>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
