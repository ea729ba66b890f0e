//! System DNS configuration and its change notifications.
//!
//! Chromium mapping: net/dns/dns_config_service.h, net/dns/dns_hosts.h
//!
//! [`DnsConfig`] describes nameservers, search list and the static hosts
//! table. [`DnsConfigService`] publishes the current configuration through a
//! `tokio::sync::watch` channel; the resolver subscribes to it.

use crate::base::address::{AddressFamily, AddressList};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;

#[cfg(unix)]
const HOSTS_PATH: &str = "/etc/hosts";
#[cfg(windows)]
const HOSTS_PATH: &str = r"C:\Windows\System32\drivers\etc\hosts";
#[cfg(not(any(unix, windows)))]
const HOSTS_PATH: &str = "hosts";

/// Static hostname to address table, one address per (name, family).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsHosts {
    entries: HashMap<(String, AddressFamily), IpAddr>,
}

impl DnsHosts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `/etc/hosts` text format.
    ///
    /// Each line holds an address followed by one or more names; `#` starts
    /// a comment. Names are stored lowercase. The first address seen for a
    /// (name, family) pair wins.
    pub fn parse(contents: &str) -> Self {
        let mut hosts = Self::new();
        for line in contents.lines() {
            let line = line.split('#').next().unwrap_or("");
            let mut fields = line.split_whitespace();
            let Some(ip) = fields.next().and_then(|ip| ip.parse::<IpAddr>().ok()) else {
                continue;
            };
            for name in fields {
                hosts.insert_if_absent(name, ip);
            }
        }
        hosts
    }

    /// Read and parse a hosts file.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Set the address of `name` for the family of `ip`.
    pub fn insert(&mut self, name: &str, ip: IpAddr) {
        self.entries
            .insert((name.to_ascii_lowercase(), AddressFamily::of(&ip)), ip);
    }

    fn insert_if_absent(&mut self, name: &str, ip: IpAddr) {
        self.entries
            .entry((name.to_ascii_lowercase(), AddressFamily::of(&ip)))
            .or_insert(ip);
    }

    /// Add loopback entries for `localhost` unless the table has its own.
    pub fn ensure_localhost(&mut self) {
        self.insert_if_absent("localhost", IpAddr::V4(Ipv4Addr::LOCALHOST));
        self.insert_if_absent("localhost", IpAddr::V6(Ipv6Addr::LOCALHOST));
    }

    /// Address for an exact (name, family) pair.
    pub fn get(&self, name: &str, family: AddressFamily) -> Option<IpAddr> {
        self.entries
            .get(&(name.to_ascii_lowercase(), family))
            .copied()
    }

    /// Answer a lookup from the table.
    ///
    /// An unspecified family yields the IPv4 entry followed by the IPv6
    /// entry, whichever exist.
    pub fn lookup(&self, name: &str, family: AddressFamily, port: u16) -> Option<AddressList> {
        let name = name.to_ascii_lowercase();
        let mut addrs = AddressList::default();
        for candidate in [AddressFamily::Ipv4, AddressFamily::Ipv6] {
            if family != AddressFamily::Unspecified && family != candidate {
                continue;
            }
            if let Some(ip) = self.entries.get(&(name.clone(), candidate)) {
                addrs.push(SocketAddr::new(*ip, port));
            }
        }
        (!addrs.is_empty()).then_some(addrs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// DNS client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Nameservers in the order they should be tried.
    pub nameservers: Vec<SocketAddr>,
    /// Suffix search list.
    pub search: Vec<String>,
    /// Minimum dots before a name is tried as-is first.
    pub ndots: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Attempts per nameserver.
    pub attempts: usize,
    /// Round-robin across nameservers.
    pub rotate: bool,
    /// Whether multi-label names are also tried with the search suffixes.
    pub append_to_multi_label_name: bool,
    /// Static hosts table.
    #[serde(skip)]
    pub hosts: DnsHosts,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            search: Vec::new(),
            ndots: 1,
            timeout: Duration::from_secs(1),
            attempts: 1,
            rotate: false,
            append_to_multi_label_name: true,
            hosts: DnsHosts::default(),
        }
    }
}

impl DnsConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// A config is usable only with at least one nameserver.
    pub fn is_valid(&self) -> bool {
        !self.nameservers.is_empty()
    }

    /// Add a nameserver.
    pub fn nameserver(mut self, addr: SocketAddr) -> Self {
        self.nameservers.push(addr);
        self
    }

    /// Add a search suffix.
    pub fn search_domain(mut self, suffix: impl Into<String>) -> Self {
        self.search.push(suffix.into());
        self
    }

    /// Set ndots.
    pub fn ndots(mut self, ndots: u32) -> Self {
        self.ndots = ndots;
        self
    }

    /// Replace the hosts table.
    pub fn hosts(mut self, hosts: DnsHosts) -> Self {
        self.hosts = hosts;
        self
    }

    /// Read the platform configuration and hosts file.
    pub fn from_system() -> io::Result<Self> {
        let (resolver_config, opts) = hickory_resolver::system_conf::read_system_conf()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let mut nameservers = Vec::new();
        for ns in resolver_config.name_servers() {
            if !nameservers.contains(&ns.socket_addr) {
                nameservers.push(ns.socket_addr);
            }
        }

        let mut hosts = match DnsHosts::from_file(HOSTS_PATH) {
            Ok(hosts) => hosts,
            Err(e) => {
                tracing::warn!(path = HOSTS_PATH, error = %e, "failed to read hosts file");
                DnsHosts::new()
            }
        };
        hosts.ensure_localhost();

        Ok(Self {
            nameservers,
            search: resolver_config
                .search()
                .iter()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .collect(),
            ndots: opts.ndots as u32,
            timeout: opts.timeout,
            attempts: opts.attempts,
            rotate: false,
            append_to_multi_label_name: true,
            hosts,
        })
    }
}

/// Publisher of the current DNS configuration.
///
/// `None` means no usable configuration is known.
#[derive(Debug)]
pub struct DnsConfigService {
    tx: watch::Sender<Option<DnsConfig>>,
}

impl DnsConfigService {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Publish a new configuration, keeping the current hosts table.
    pub fn change_config(&self, config: DnsConfig) {
        self.tx.send_modify(|current| {
            let hosts = current
                .as_ref()
                .map(|c| c.hosts.clone())
                .unwrap_or_default();
            *current = Some(DnsConfig { hosts, ..config });
        });
    }

    /// Publish a new hosts table, keeping the current configuration.
    pub fn change_hosts(&self, hosts: DnsHosts) {
        self.tx.send_modify(|current| {
            current.get_or_insert_with(DnsConfig::default).hosts = hosts;
        });
    }

    /// Drop the current configuration.
    pub fn invalidate(&self) {
        self.tx.send_replace(None);
    }

    /// Load the system configuration and publish it.
    pub fn read_system(&self) -> io::Result<()> {
        let config = DnsConfig::from_system()?;
        tracing::debug!(
            nameservers = config.nameservers.len(),
            hosts = config.hosts.len(),
            "read system DNS configuration"
        );
        self.tx.send_replace(Some(config));
        Ok(())
    }

    pub fn config(&self) -> Option<DnsConfig> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DnsConfig>> {
        self.tx.subscribe()
    }
}

impl Default for DnsConfigService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HOSTS: &str = "\
# comment line
127.0.0.1   localhost LocalHost.localdomain
::1         localhost ip6-localhost
192.168.1.10 Router router.lan # trailing comment
10.0.0.1     router
not-an-ip    ignored
";

    #[test]
    fn test_parse_hosts() {
        let hosts = DnsHosts::parse(HOSTS);

        assert_eq!(
            hosts.get("localhost", AddressFamily::Ipv4),
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
        );
        assert_eq!(
            hosts.get("localhost", AddressFamily::Ipv6),
            Some(IpAddr::V6(Ipv6Addr::LOCALHOST))
        );
        assert!(hosts.get("localhost.localdomain", AddressFamily::Ipv4).is_some());
        // First entry wins and names are case-insensitive.
        assert_eq!(
            hosts.get("ROUTER", AddressFamily::Ipv4),
            Some("192.168.1.10".parse().unwrap())
        );
        assert!(hosts.get("ignored", AddressFamily::Ipv4).is_none());
        assert_eq!(hosts.len(), 6);
    }

    #[test]
    fn test_lookup_families() {
        let hosts = DnsHosts::parse(HOSTS);

        let both = hosts
            .lookup("localhost", AddressFamily::Unspecified, 80)
            .unwrap();
        let rendered: Vec<String> = both.iter().map(|a| a.to_string()).collect();
        assert_eq!(rendered, vec!["127.0.0.1:80", "[::1]:80"]);

        let v6 = hosts.lookup("localhost", AddressFamily::Ipv6, 80).unwrap();
        assert_eq!(v6.len(), 1);
        assert_eq!(v6.first().unwrap().to_string(), "[::1]:80");

        assert!(hosts.lookup("router", AddressFamily::Ipv6, 80).is_none());
        assert!(hosts.lookup("missing", AddressFamily::Unspecified, 80).is_none());
    }

    #[test]
    fn test_ensure_localhost_keeps_existing() {
        let mut hosts = DnsHosts::parse("127.0.0.2 localhost");
        hosts.ensure_localhost();
        assert_eq!(
            hosts.get("localhost", AddressFamily::Ipv4),
            Some("127.0.0.2".parse().unwrap())
        );
        assert_eq!(
            hosts.get("localhost", AddressFamily::Ipv6),
            Some(IpAddr::V6(Ipv6Addr::LOCALHOST))
        );
    }

    #[test]
    fn test_hosts_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(HOSTS.as_bytes()).unwrap();
        let hosts = DnsHosts::from_file(file.path()).unwrap();
        assert_eq!(hosts, DnsHosts::parse(HOSTS));

        assert!(DnsHosts::from_file("/nonexistent/hosts").is_err());
    }

    #[test]
    fn test_config_validity() {
        assert!(!DnsConfig::new().is_valid());
        let config = DnsConfig::new().nameserver("192.168.1.1:53".parse().unwrap());
        assert!(config.is_valid());
    }

    #[test]
    fn test_service_merges_config_and_hosts() {
        let service = DnsConfigService::new();
        let rx = service.subscribe();
        assert!(rx.borrow().is_none());

        let mut hosts = DnsHosts::new();
        hosts.insert("example", IpAddr::V4(Ipv4Addr::LOCALHOST));
        service.change_hosts(hosts.clone());
        service.change_config(DnsConfig::new().nameserver("10.0.0.1:53".parse().unwrap()));

        let current = rx.borrow().clone().unwrap();
        assert!(current.is_valid());
        assert_eq!(current.hosts, hosts);

        service.invalidate();
        assert!(service.config().is_none());
    }
}
