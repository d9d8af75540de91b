//! Workload identity resolution.
//!
//! The core consumes the [`WorkloadResolver`] capability and never links a
//! concrete backend: a cluster orchestrator client, a static map, or a
//! no-op stub all satisfy the same two-method trait. [`CachingResolver`]
//! wraps any backend with the bounded cache, rate limiter, and graceful
//! fallback the pipeline relies on.

pub mod caching;
pub mod rate_limit;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::context::RunContext;
use crate::core::errors::{Result, SpectreError};
use crate::core::models::WorkloadIdentity;

pub use caching::CachingResolver;

/// Capability mapping a client address to a workload identity.
#[async_trait]
pub trait WorkloadResolver: Send + Sync {
    /// Resolve an address to a workload identity, or a not-found error.
    async fn resolve(&self, ctx: &RunContext, address: &str) -> Result<WorkloadIdentity>;

    /// Release backend resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Map-backed resolver. An empty map doubles as the no-op stub the CLI
/// wires in: every lookup misses and the caching wrapper degrades the
/// identity to the raw address.
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: HashMap<String, WorkloadIdentity>,
}

impl StaticResolver {
    /// Create a resolver over a fixed address→identity map.
    pub fn new(entries: HashMap<String, WorkloadIdentity>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl WorkloadResolver for StaticResolver {
    async fn resolve(&self, _ctx: &RunContext, address: &str) -> Result<WorkloadIdentity> {
        self.entries
            .get(address)
            .cloned()
            .ok_or_else(|| SpectreError::not_found(format!("no workload for address {address}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_returns_mapped_identity() {
        let mut entries = HashMap::new();
        entries.insert(
            "10.0.0.1".to_string(),
            WorkloadIdentity {
                name: "ingest".into(),
                group: "pipelines".into(),
                instance: "ingest-0".into(),
            },
        );
        let resolver = StaticResolver::new(entries);

        let identity = resolver
            .resolve(&RunContext::new(), "10.0.0.1")
            .await
            .unwrap();
        assert_eq!(identity.name, "ingest");
    }

    #[tokio::test]
    async fn static_resolver_misses_with_not_found() {
        let resolver = StaticResolver::default();
        let err = resolver
            .resolve(&RunContext::new(), "10.0.0.9")
            .await
            .unwrap_err();
        assert!(matches!(err, SpectreError::NotFound { .. }));
    }
}
