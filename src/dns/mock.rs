//! Test doubles for the resolver's collaborators.
//!
//! Chromium mapping: net/base/mock_host_resolver.h, net/dns/dns_test_util.h
//!
//! These are shipped with the library so that crates embedding the
//! resolver can script lookups without touching the network.

use super::client::{DnsClient, DnsResolving};
use super::config::DnsConfig;
use super::gai::{HostResolverProc, SystemHostResolverProc};
use crate::base::address::{AddressFamily, AddressList, HostResolverFlags};
use crate::base::neterror::NetError;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone)]
enum RuleResult {
    // Comma separated IP literals, or a hostname resolved by the fallback.
    Replace(String),
    Fail,
    Direct,
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    family: AddressFamily,
    result: RuleResult,
}

/// Host resolver proc driven by pattern rules.
///
/// Patterns support `*` and `?` wildcards and match case-insensitively.
/// Rules are consulted in insertion order; the first match decides. A host
/// no rule matches goes to the fallback proc (the system resolver unless
/// another one is given).
#[derive(Debug)]
pub struct RuleBasedHostResolverProc {
    rules: Mutex<Vec<Rule>>,
    fallback: Arc<dyn HostResolverProc>,
}

impl RuleBasedHostResolverProc {
    pub fn new() -> Self {
        Self::with_fallback(Arc::new(SystemHostResolverProc::new()))
    }

    pub fn with_fallback(fallback: Arc<dyn HostResolverProc>) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            fallback,
        }
    }

    /// A proc that maps every host to 127.0.0.1.
    pub fn catch_all() -> Self {
        let proc = Self::new();
        proc.add_rule("*", "127.0.0.1");
        proc
    }

    /// Map hosts matching `pattern` to `replacement`.
    ///
    /// `replacement` is either a comma separated list of IP literals or a
    /// hostname handed to the fallback proc.
    pub fn add_rule(&self, pattern: &str, replacement: &str) {
        self.add_rule_for_address_family(pattern, AddressFamily::Unspecified, replacement);
    }

    /// Like [`add_rule`](Self::add_rule) but only for lookups of `family`.
    pub fn add_rule_for_address_family(
        &self,
        pattern: &str,
        family: AddressFamily,
        replacement: &str,
    ) {
        self.push(pattern, family, RuleResult::Replace(replacement.to_string()));
    }

    /// Fail lookups of hosts matching `pattern`.
    pub fn add_simulated_failure(&self, pattern: &str) {
        self.push(pattern, AddressFamily::Unspecified, RuleResult::Fail);
    }

    /// Send hosts matching `pattern` to the fallback unchanged.
    pub fn allow_direct_lookup(&self, pattern: &str) {
        self.push(pattern, AddressFamily::Unspecified, RuleResult::Direct);
    }

    pub fn clear_rules(&self) {
        self.lock().clear();
    }

    fn push(&self, pattern: &str, family: AddressFamily, result: RuleResult) {
        self.lock().push(Rule {
            pattern: pattern.to_ascii_lowercase(),
            family,
            result,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Rule>> {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RuleBasedHostResolverProc {
    fn default() -> Self {
        Self::new()
    }
}

impl HostResolverProc for RuleBasedHostResolverProc {
    fn resolve(
        &self,
        host: &str,
        address_family: AddressFamily,
        flags: HostResolverFlags,
    ) -> Result<AddressList, NetError> {
        let lowered = host.to_ascii_lowercase();
        let rule = self
            .lock()
            .iter()
            .find(|rule| {
                (rule.family == AddressFamily::Unspecified || rule.family == address_family)
                    && match_pattern(&lowered, &rule.pattern)
            })
            .cloned();

        match rule.map(|rule| rule.result) {
            Some(RuleResult::Fail) => Err(NetError::NameNotResolved),
            Some(RuleResult::Replace(replacement)) => {
                let ips: Option<Vec<IpAddr>> = replacement
                    .split(',')
                    .map(|ip| ip.trim().parse::<IpAddr>().ok())
                    .collect();
                match ips {
                    Some(ips) => {
                        let mut addrs = AddressList::from_ips(ips, 0);
                        if flags.contains(HostResolverFlags::CANONNAME) {
                            addrs.set_canonical_name(host);
                        }
                        Ok(addrs)
                    }
                    None => self.fallback.resolve(&replacement, address_family, flags),
                }
            }
            Some(RuleResult::Direct) | None => self.fallback.resolve(host, address_family, flags),
        }
    }
}

/// Glob match with `*` (any run) and `?` (any single character).
fn match_pattern(text: &str, pattern: &str) -> bool {
    let text = text.as_bytes();
    let pattern = pattern.as_bytes();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

/// Canned answer of a [`MockDnsClient`].
#[derive(Debug, Clone)]
pub enum MockDnsResult {
    Ok(Vec<IpAddr>),
    Fail(NetError),
    /// Never completes.
    Hang,
}

/// Scripted DNS client.
///
/// Without an explicit rule, names starting with `ok` resolve to
/// 127.0.0.1, names starting with `nx` fail with `NameNotResolved` and
/// everything else fails with `DnsServerFailed`.
#[derive(Debug, Default)]
pub struct MockDnsClient {
    config: Mutex<Option<DnsConfig>>,
    rules: Mutex<HashMap<String, MockDnsResult>>,
    queries: Mutex<Vec<String>>,
}

impl MockDnsClient {
    pub fn new(config: DnsConfig) -> Self {
        let client = Self::default();
        client.set_config(Some(config));
        client
    }

    pub fn add_rule(&self, hostname: &str, result: MockDnsResult) {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hostname.to_string(), result);
    }

    /// Hostnames queried so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn result_for(&self, hostname: &str) -> MockDnsResult {
        if let Some(result) = self
            .rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hostname)
        {
            return result.clone();
        }
        if hostname.starts_with("ok") {
            MockDnsResult::Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
        } else if hostname.starts_with("nx") {
            MockDnsResult::Fail(NetError::NameNotResolved)
        } else {
            MockDnsResult::Fail(NetError::DnsServerFailed)
        }
    }
}

impl DnsClient for MockDnsClient {
    fn set_config(&self, config: Option<DnsConfig>) {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config;
    }

    fn config(&self) -> Option<DnsConfig> {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn resolve(&self, hostname: &str, address_family: AddressFamily) -> DnsResolving {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hostname.to_string());
        match self.result_for(hostname) {
            MockDnsResult::Ok(ips) => {
                let addrs =
                    AddressList::from_ips(ips.into_iter().filter(|ip| address_family.matches(ip)), 0);
                Box::pin(async move {
                    if addrs.is_empty() {
                        Err(NetError::NameNotResolved)
                    } else {
                        Ok(addrs)
                    }
                })
            }
            MockDnsResult::Fail(err) => Box::pin(async move { Err(err) }),
            MockDnsResult::Hang => Box::pin(std::future::pending()),
        }
    }
}
