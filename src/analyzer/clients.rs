//! Client model fold with optional workload resolution.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::analyzer::Analyzer;
use crate::core::context::RunContext;
use crate::core::models::{Client, LogRow, WorkloadIdentity};

impl Analyzer {
    /// Fold log rows into per-client counters and table-usage sets.
    ///
    /// When resolution is enabled, the distinct client addresses are
    /// resolved up front with bounded concurrency; the fold itself stays a
    /// single-writer pass. Resolver failures never abort the fold; the
    /// affected client just keeps its raw address identity.
    pub(super) async fn fold_clients(&mut self, ctx: &RunContext, rows: &[LogRow]) {
        let resolved = self.prefetch_workloads(ctx, rows).await;

        for row in rows {
            let address = row.client_address.as_str();
            if address.is_empty() {
                continue;
            }

            let client = self.clients.entry(address.to_string()).or_insert_with(|| {
                let mut client = Client::new(address);
                client.workload = resolved.get(address).cloned();
                client
            });

            client.query_count += 1;
            client.last_seen = Some(match client.last_seen {
                Some(last) => last.max(row.event_time),
                None => row.event_time,
            });

            for table_name in &row.tables {
                if table_name.is_empty() || self.filter.is_table_excluded(table_name) {
                    continue;
                }
                if !client.tables_used.contains(table_name) {
                    client.tables_used.push(table_name.clone());
                }
            }
        }
    }

    /// Resolve the distinct client addresses appearing in the rows, bounded
    /// by the configured concurrency.
    async fn prefetch_workloads(
        &self,
        ctx: &RunContext,
        rows: &[LogRow],
    ) -> HashMap<String, WorkloadIdentity> {
        let resolver = match &self.resolver {
            Some(resolver) if self.config.resolve_workloads => Arc::clone(resolver),
            _ => return HashMap::new(),
        };

        let mut addresses: Vec<String> = Vec::new();
        for row in rows {
            let address = row.client_address.as_str();
            if !address.is_empty() && !addresses.iter().any(|a| a == address) {
                addresses.push(address.to_string());
            }
        }

        stream::iter(addresses)
            .map(|address| {
                let resolver = Arc::clone(&resolver);
                let ctx = ctx.clone();
                async move {
                    let identity = resolver.resolve(&ctx, &address).await.ok();
                    (address, identity)
                }
            })
            .buffer_unordered(self.config.concurrency)
            .filter_map(|(address, identity)| async move {
                identity.map(|identity| (address, identity))
            })
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};

    use crate::analyzer::test_support::log_row;
    use crate::core::config::Config;
    use crate::core::exclude::ExclusionFilter;
    use crate::resolver::{CachingResolver, StaticResolver};

    fn at(hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    fn analyzer(config: Config, resolver: Option<Arc<CachingResolver>>) -> Analyzer {
        let filter = ExclusionFilter::new(&config.exclude_tables, &config.exclude_databases);
        Analyzer::new(Arc::new(config), filter, resolver)
    }

    #[tokio::test]
    async fn counts_queries_and_tracks_tables_in_order() {
        let mut analyzer = analyzer(
            Config {
                dsn: "http://localhost:8123".into(),
                ..Config::default()
            },
            None,
        );
        let rows = vec![
            log_row("Select", at(10), "10.0.0.1", &["db.b"], 1, 0),
            log_row("Select", at(11), "10.0.0.1", &["db.a", "db.b"], 1, 0),
            log_row("Select", at(12), "10.0.0.2", &["db.a"], 1, 0),
        ];
        analyzer.fold_clients(&RunContext::new(), &rows).await;

        let client = &analyzer.clients()["10.0.0.1"];
        assert_eq!(client.query_count, 2);
        assert_eq!(client.tables_used, vec!["db.b".to_string(), "db.a".to_string()]);
        assert_eq!(client.last_seen, Some(at(11)));
        assert_eq!(analyzer.clients().len(), 2);
    }

    #[tokio::test]
    async fn rows_without_address_are_ignored() {
        let mut analyzer = analyzer(
            Config {
                dsn: "http://localhost:8123".into(),
                ..Config::default()
            },
            None,
        );
        let rows = vec![log_row("Select", at(10), "", &["db.a"], 1, 0)];
        analyzer.fold_clients(&RunContext::new(), &rows).await;
        assert!(analyzer.clients().is_empty());
    }

    #[tokio::test]
    async fn excluded_tables_stay_out_of_usage_sets() {
        let mut analyzer = analyzer(
            Config {
                dsn: "http://localhost:8123".into(),
                exclude_tables: vec!["db.secret".into()],
                ..Config::default()
            },
            None,
        );
        let rows = vec![log_row(
            "Select",
            at(10),
            "10.0.0.1",
            &["db.secret", "db.open"],
            1,
            0,
        )];
        analyzer.fold_clients(&RunContext::new(), &rows).await;

        assert_eq!(
            analyzer.clients()["10.0.0.1"].tables_used,
            vec!["db.open".to_string()]
        );
    }

    #[tokio::test]
    async fn resolution_populates_workload_identity() {
        let mut entries = HashMap::new();
        entries.insert(
            "10.0.0.1".to_string(),
            WorkloadIdentity {
                name: "ingest".into(),
                group: "pipelines".into(),
                instance: "ingest-0".into(),
            },
        );
        let resolver = Arc::new(CachingResolver::new(
            Arc::new(StaticResolver::new(entries)),
            std::time::Duration::from_secs(300),
            10,
        ));

        let mut analyzer = analyzer(
            Config {
                dsn: "http://localhost:8123".into(),
                resolve_workloads: true,
                ..Config::default()
            },
            Some(resolver),
        );
        let rows = vec![
            log_row("Select", at(10), "10.0.0.1", &["db.a"], 1, 0),
            log_row("Select", at(10), "10.0.0.9", &["db.a"], 1, 0),
        ];
        analyzer.fold_clients(&RunContext::new(), &rows).await;

        let resolved = &analyzer.clients()["10.0.0.1"];
        assert_eq!(resolved.workload.as_ref().unwrap().name, "ingest");
        assert_eq!(resolved.display_name(), "ingest");

        // Unknown address degrades to the raw-address identity.
        let fallback = &analyzer.clients()["10.0.0.9"];
        assert_eq!(fallback.workload.as_ref().unwrap().name, "10.0.0.9");
    }

    #[tokio::test]
    async fn resolution_disabled_leaves_workloads_empty() {
        let resolver = Arc::new(CachingResolver::new(
            Arc::new(StaticResolver::default()),
            std::time::Duration::from_secs(300),
            10,
        ));
        let mut analyzer = analyzer(
            Config {
                dsn: "http://localhost:8123".into(),
                resolve_workloads: false,
                ..Config::default()
            },
            Some(resolver),
        );
        let rows = vec![log_row("Select", at(10), "10.0.0.1", &["db.a"], 1, 0)];
        analyzer.fold_clients(&RunContext::new(), &rows).await;

        assert!(analyzer.clients()["10.0.0.1"].workload.is_none());
    }
}
