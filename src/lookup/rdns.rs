use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// DNS cache entry
struct CacheEntry {
    hostname: Option<String>,
    cached_at: Instant,
}

/// Cached best-effort reverse DNS lookup.
///
/// Every failure path yields None; callers substitute an empty hostname.
/// Name resolution must never fail a probe.
pub struct RdnsCache {
    resolver: TokioAsyncResolver,
    cache: RwLock<HashMap<IpAddr, CacheEntry>>,
    cache_ttl: Duration,
}

impl Default for RdnsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RdnsCache {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

        Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(3600), // 1 hour
        }
    }

    /// Lookup reverse DNS for an IP, using the cache. Negative results are
    /// cached too, so dead PTR zones are not re-queried every cycle.
    pub async fn reverse(&self, ip: IpAddr) -> Option<String> {
        {
            let cache = self.cache.read();
            if let Some(entry) = cache.get(&ip)
                && entry.cached_at.elapsed() < self.cache_ttl
            {
                return entry.hostname.clone();
            }
        }

        let hostname = match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup.iter().next().map(|name| {
                let s = name.to_string();
                s.trim_end_matches('.').to_string()
            }),
            Err(_) => None,
        };

        {
            let mut cache = self.cache.write();
            cache.insert(
                ip,
                CacheEntry {
                    hostname: hostname.clone(),
                    cached_at: Instant::now(),
                },
            );
        }

        hostname
    }
}
