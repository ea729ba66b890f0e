//! Host cache.
//!
//! Chromium mapping: net/base/host_cache.h
//!
//! Maps a resolution key to the addresses of its last successful lookup
//! until the entry expires. Failures are never stored, so a failed lookup
//! cannot poison a retry.

use crate::base::address::{AddressFamily, AddressList, HostResolverFlags};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default number of entries kept.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default lifetime of a successful lookup.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Resolution key. Port and priority are deliberately absent.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct HostCacheKey {
    pub hostname: String,
    pub address_family: AddressFamily,
    pub flags: HostResolverFlags,
}

impl HostCacheKey {
    pub fn new(
        hostname: impl Into<String>,
        address_family: AddressFamily,
        flags: HostResolverFlags,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            address_family,
            flags,
        }
    }
}

/// Cached lookup result.
#[derive(Debug, Clone)]
pub struct HostCacheEntry {
    pub addresses: AddressList,
    pub expires: Instant,
}

impl HostCacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires
    }
}

/// Bounded in-memory cache of successful resolutions.
#[derive(Debug)]
pub struct HostCache {
    entries: HashMap<HostCacheKey, HostCacheEntry>,
    max_entries: usize,
}

impl HostCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
        }
    }

    /// Fresh entry for `key`, if any.
    pub fn lookup(&self, key: &HostCacheKey, now: Instant) -> Option<&HostCacheEntry> {
        self.entries.get(key).filter(|entry| !entry.is_expired(now))
    }

    /// Store a successful lookup, replacing any previous entry for `key`.
    pub fn set(&mut self, key: HostCacheKey, addresses: AddressList, now: Instant, ttl: Duration) {
        if self.max_entries == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict(now);
        }
        self.entries.insert(
            key,
            HostCacheEntry {
                addresses,
                expires: now + ttl,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    // Expired entries go first; if none, the one closest to expiry.
    fn evict(&mut self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        if self.entries.len() < before {
            return;
        }
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires)
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            tracing::trace!(host = %key.hostname, "evicting host cache entry");
            self.entries.remove(&key);
        }
    }
}

impl Default for HostCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn key(host: &str) -> HostCacheKey {
        HostCacheKey::new(host, AddressFamily::Unspecified, HostResolverFlags::empty())
    }

    fn addrs(last: u8) -> AddressList {
        AddressList::from_ips([IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))], 0)
    }

    #[test]
    fn test_lookup_respects_ttl() {
        let mut cache = HostCache::new(10);
        let now = Instant::now();
        cache.set(key("foobar.com"), addrs(1), now, Duration::from_secs(10));

        assert!(cache.lookup(&key("foobar.com"), now).is_some());
        assert!(cache
            .lookup(&key("foobar.com"), now + Duration::from_secs(9))
            .is_some());
        assert!(cache
            .lookup(&key("foobar.com"), now + Duration::from_secs(10))
            .is_none());
        assert!(cache.lookup(&key("other.com"), now).is_none());
    }

    #[test]
    fn test_key_distinguishes_family_and_flags() {
        let mut cache = HostCache::new(10);
        let now = Instant::now();
        cache.set(key("foobar.com"), addrs(1), now, DEFAULT_CACHE_TTL);

        let v4 = HostCacheKey::new(
            "foobar.com",
            AddressFamily::Ipv4,
            HostResolverFlags::empty(),
        );
        let canon = HostCacheKey::new(
            "foobar.com",
            AddressFamily::Unspecified,
            HostResolverFlags::CANONNAME,
        );
        assert!(cache.lookup(&v4, now).is_none());
        assert!(cache.lookup(&canon, now).is_none());
    }

    #[test]
    fn test_eviction_prefers_expired_then_oldest() {
        let mut cache = HostCache::new(2);
        let now = Instant::now();
        cache.set(key("a"), addrs(1), now, Duration::from_secs(5));
        cache.set(key("b"), addrs(2), now, Duration::from_secs(50));

        // "a" has expired by now, so it goes.
        let later = now + Duration::from_secs(6);
        cache.set(key("c"), addrs(3), later, Duration::from_secs(50));
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&key("a"), later).is_none());

        // Nothing expired: the entry closest to expiry ("b") goes.
        cache.set(key("d"), addrs(4), later, Duration::from_secs(50));
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&key("b"), later).is_none());
        assert!(cache.lookup(&key("c"), later).is_some());
        assert!(cache.lookup(&key("d"), later).is_some());
    }

    #[test]
    fn test_zero_capacity_disables_storage() {
        let mut cache = HostCache::new(0);
        cache.set(key("a"), addrs(1), Instant::now(), DEFAULT_CACHE_TTL);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite_and_clear() {
        let mut cache = HostCache::new(1);
        let now = Instant::now();
        cache.set(key("a"), addrs(1), now, DEFAULT_CACHE_TTL);
        cache.set(key("a"), addrs(2), now, DEFAULT_CACHE_TTL);
        assert_eq!(cache.len(), 1);
        let entry = cache.lookup(&key("a"), now).unwrap();
        assert_eq!(entry.addresses, addrs(2));

        cache.clear();
        assert!(cache.is_empty());
    }
}
