//! Caching, rate-limited wrapper around any workload resolver backend.
//!
//! Lookups hit a bounded TTL cache first; misses pass the token-bucket
//! limiter and run under a per-call sub-deadline. A backend failure never
//! propagates: the identity degrades to the raw address and that synthetic
//! answer is cached too, so a dead backend costs one call per address per
//! TTL window.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tracing::debug;

use crate::core::context::RunContext;
use crate::core::errors::Result;
use crate::core::models::WorkloadIdentity;
use crate::resolver::rate_limit::RateLimiter;
use crate::resolver::WorkloadResolver;

/// Per-call resolution deadline.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);
/// Maximum cached addresses.
const CACHE_CAPACITY: u64 = 10_000;
/// Prefix ClickHouse puts on IPv6-mapped IPv4 addresses.
const MAPPED_V4_PREFIX: &str = "::ffff:";

/// Caching front for a [`WorkloadResolver`] backend.
pub struct CachingResolver {
    inner: Arc<dyn WorkloadResolver>,
    cache: Cache<String, WorkloadIdentity>,
    limiter: RateLimiter,
}

impl CachingResolver {
    /// Wrap a backend with a TTL cache and a token-bucket limiter. Burst
    /// capacity is twice the per-second rate.
    pub fn new(inner: Arc<dyn WorkloadResolver>, cache_ttl: Duration, rate_limit: u32) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(cache_ttl)
            .build();

        Self {
            inner,
            cache,
            limiter: RateLimiter::new(rate_limit, rate_limit.saturating_mul(2)),
        }
    }

    /// Resolve an address, consulting the cache first.
    ///
    /// Backend errors degrade to a synthetic identity whose name is the raw
    /// address; only a context failure (deadline, cancel) while waiting on
    /// the limiter surfaces as an error.
    pub async fn resolve(&self, ctx: &RunContext, address: &str) -> Result<WorkloadIdentity> {
        if let Some(hit) = self.cache.get(address) {
            debug!(address, workload = %hit.name, "resolver cache hit");
            return Ok(hit);
        }

        self.limiter.acquire(ctx).await?;

        let clean = address.strip_prefix(MAPPED_V4_PREFIX).unwrap_or(address);
        let call_ctx = ctx.with_timeout(RESOLVE_TIMEOUT);

        let identity = match self.inner.resolve(&call_ctx, clean).await {
            Ok(identity) => {
                debug!(address, workload = %identity.name, "resolved workload");
                identity
            }
            Err(err) => {
                debug!(address, error = %err, "resolution failed, falling back to raw address");
                WorkloadIdentity::fallback(address)
            }
        };

        self.cache.insert(address.to_string(), identity.clone());
        Ok(identity)
    }

    /// Number of cached addresses.
    pub fn cache_size(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Close the wrapped backend.
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
