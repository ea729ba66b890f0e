//! DNS client backed by hickory-dns.
//!
//! Builds a `TokioResolver` from the resolver's current [`DnsConfig`] and
//! rebuilds it whenever the configuration changes. Lookups are fully async
//! and never touch the worker pool.

use super::client::{DnsClient, DnsResolving};
use super::config::DnsConfig;
use crate::base::address::{AddressFamily, AddressList};
use crate::base::neterror::NetError;
use hickory_resolver::{
    config::{
        LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts,
        ServerOrderingStrategy,
    },
    name_server::TokioConnectionProvider,
    proto::rr::Name as DnsName,
    TokioResolver,
};
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

struct ClientState {
    config: DnsConfig,
    resolver: TokioResolver,
}

/// [`DnsClient`] implemented with hickory-dns.
///
/// # Example
///
/// ```rust,ignore
/// use hostresolver::dns::{DnsClient, DnsConfig, HickoryDnsClient};
///
/// let client = HickoryDnsClient::new();
/// client.set_config(Some(DnsConfig::new().nameserver("8.8.8.8:53".parse()?)));
/// let addrs = client.resolve("example.com", AddressFamily::Unspecified).await?;
/// ```
#[derive(Default)]
pub struct HickoryDnsClient {
    state: RwLock<Option<ClientState>>,
}

impl HickoryDnsClient {
    /// Creates a client with no configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client using `config`.
    pub fn with_config(config: DnsConfig) -> Self {
        let client = Self::new();
        client.set_config(Some(config));
        client
    }

    fn build_resolver(config: &DnsConfig) -> TokioResolver {
        let mut name_servers = NameServerConfigGroup::new();
        for ns in &config.nameservers {
            name_servers.merge(NameServerConfigGroup::from_ips_clear(
                &[ns.ip()],
                ns.port(),
                true,
            ));
        }
        let search = config
            .search
            .iter()
            .filter_map(|suffix| match DnsName::from_str(suffix) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!(suffix = %suffix, error = %e, "ignoring invalid search suffix");
                    None
                }
            })
            .collect();

        let mut builder = TokioResolver::builder_with_config(
            ResolverConfig::from_parts(None, search, name_servers),
            TokioConnectionProvider::default(),
        );
        apply_options(config, builder.options_mut());
        builder.build()
    }
}

fn apply_options(config: &DnsConfig, opts: &mut ResolverOpts) {
    opts.ndots = config.ndots as usize;
    opts.timeout = config.timeout;
    opts.attempts = config.attempts;
    opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
    opts.server_ordering_strategy = if config.rotate {
        ServerOrderingStrategy::RoundRobin
    } else {
        ServerOrderingStrategy::UserProvidedOrder
    };
}

/// Name handed to hickory for `hostname`.
///
/// Without `append_to_multi_label_name`, dotted names are made fully
/// qualified so the search list only applies to single labels.
fn query_name(hostname: &str, append_to_multi_label_name: bool) -> String {
    let multi_label = hostname.trim_end_matches('.').contains('.');
    if !append_to_multi_label_name && multi_label && !hostname.ends_with('.') {
        format!("{hostname}.")
    } else {
        hostname.to_string()
    }
}

impl DnsClient for HickoryDnsClient {
    fn set_config(&self, config: Option<DnsConfig>) {
        let state = config.filter(DnsConfig::is_valid).map(|config| ClientState {
            resolver: Self::build_resolver(&config),
            config,
        });
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn config(&self) -> Option<DnsConfig> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|state| state.config.clone())
    }

    fn resolve(&self, hostname: &str, address_family: AddressFamily) -> DnsResolving {
        let (resolver, domain) = match self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(state) => (
                Some(state.resolver.clone()),
                query_name(hostname, state.config.append_to_multi_label_name),
            ),
            None => (None, hostname.to_string()),
        };

        Box::pin(async move {
            let resolver = resolver.ok_or(NetError::Unexpected)?;
            tracing::debug!(domain = %domain, "resolving via hickory-dns");

            let lookup = resolver.lookup_ip(domain.as_str()).await.map_err(|e| {
                tracing::debug!(domain = %domain, error = %e, "hickory-dns lookup failed");
                NetError::NameNotResolved
            })?;

            let addrs =
                AddressList::from_ips(lookup.iter().filter(|ip| address_family.matches(ip)), 0);
            if addrs.is_empty() {
                return Err(NetError::NameNotResolved);
            }

            tracing::debug!(domain = %domain, count = addrs.len(), "hickory-dns resolution complete");
            Ok(addrs)
        })
    }
}

impl fmt::Debug for HickoryDnsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HickoryDnsClient")
            .field("config", &self.config())
            .finish_non_exhaustive()
    }
}
