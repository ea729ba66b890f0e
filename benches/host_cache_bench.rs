use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hostresolver::base::address::{AddressFamily, AddressList, HostResolverFlags};
use hostresolver::dns::{HostCache, HostCacheKey, HostResolverImpl, RequestInfo};
use std::time::Duration;
use tokio::time::Instant;

fn key(i: usize) -> HostCacheKey {
    HostCacheKey::new(
        format!("host{i}.example.com"),
        AddressFamily::Unspecified,
        HostResolverFlags::empty(),
    )
}

/// Benchmark cache lookups and inserts at capacity.
fn benchmark_host_cache(c: &mut Criterion) {
    let addrs = AddressList::try_parse("192.0.2.1", 0).unwrap();
    let ttl = Duration::from_secs(60);

    let mut cache = HostCache::new(100);
    let now = Instant::now();
    for i in 0..100 {
        cache.set(key(i), addrs.clone(), now, ttl);
    }
    let hit = key(42);
    c.bench_function("host_cache_lookup_hit", |b| {
        b.iter(|| black_box(cache.lookup(black_box(&hit), now)))
    });

    // Each insert past capacity evicts the entry closest to expiry.
    c.bench_function("host_cache_set_evicting", |b| {
        let mut cache = HostCache::new(100);
        let mut i = 0;
        b.iter(|| {
            cache.set(key(i), addrs.clone(), Instant::now(), ttl);
            i += 1;
        })
    });

    // Full synchronous path through the resolver for a cached name.
    let rt = tokio::runtime::Runtime::new().unwrap();
    let resolver = rt.block_on(async { HostResolverImpl::builder().build() });
    let info = RequestInfo::new("127.0.0.1", 443);
    c.bench_function("resolver_resolve_from_cache_literal", |b| {
        b.iter(|| black_box(resolver.resolve_from_cache(black_box(&info))))
    });
}

criterion_group!(benches, benchmark_host_cache);
criterion_main!(benches);
