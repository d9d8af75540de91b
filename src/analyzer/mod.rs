//! Reduction of raw log rows into the three entity graphs.
//!
//! The [`Analyzer`] folds collected log rows into per-table counters,
//! per-client usage sets, and client→table edges, then layers on the
//! catalog inventory, hour-bucketed activity series, and anomaly findings.
//! All folds are single-writer passes over the shared maps; the only
//! parallelism is the bounded resolver prefetch.

pub mod anomaly;
mod clients;
mod edges;
mod tables;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::collector::Collector;
use crate::core::config::Config;
use crate::core::context::RunContext;
use crate::core::errors::Result;
use crate::core::exclude::ExclusionFilter;
use crate::core::models::{Anomaly, Client, Edge, LogRow, Table};
use crate::resolver::CachingResolver;

/// Whether a query kind counts as a read.
pub fn is_read_kind(kind: &str) -> bool {
    kind.to_uppercase().starts_with("SELECT")
}

/// Whether a query kind counts as a write.
pub fn is_write_kind(kind: &str) -> bool {
    let kind = kind.to_uppercase();
    ["INSERT", "CREATE", "DROP", "ALTER", "UPDATE", "DELETE"]
        .iter()
        .any(|prefix| kind.starts_with(prefix))
}

/// Builds the table, client, and edge models from collected log rows.
pub struct Analyzer {
    config: Arc<Config>,
    filter: ExclusionFilter,
    resolver: Option<Arc<CachingResolver>>,
    tables: HashMap<String, Table>,
    clients: HashMap<String, Client>,
    edges: Vec<Edge>,
    anomalies: Vec<Anomaly>,
}

impl Analyzer {
    /// Create an analyzer. The resolver is only consulted when workload
    /// resolution is enabled in the configuration.
    pub fn new(
        config: Arc<Config>,
        filter: ExclusionFilter,
        resolver: Option<Arc<CachingResolver>>,
    ) -> Self {
        Self {
            config,
            filter,
            resolver,
            tables: HashMap::new(),
            clients: HashMap::new(),
            edges: Vec::new(),
            anomalies: Vec::new(),
        }
    }

    /// Run every fold over the collected rows.
    ///
    /// Order matters: tables first so the inventory merge can distinguish
    /// observed tables, clients before edges so edges can use resolved
    /// display names, and anomalies last over the finished models.
    pub async fn analyze(
        &mut self,
        ctx: &RunContext,
        rows: &[LogRow],
        collector: &Collector,
    ) -> Result<()> {
        self.fold_tables(rows);

        if self.config.detect_unused_tables {
            self.merge_inventory(ctx, collector).await?;
        }

        self.fold_clients(ctx, rows).await;
        self.fold_edges(rows);
        self.build_activity_series(rows);

        if self.config.anomaly_detection {
            self.detect_anomalies(Utc::now());
        }

        debug!(
            tables = self.tables.len(),
            clients = self.clients.len(),
            edges = self.edges.len(),
            anomalies = self.anomalies.len(),
            "analysis folds complete"
        );

        Ok(())
    }

    /// Fetch the catalog and join it into the table model. Tables present
    /// in the log are enriched in place (last writer wins); tables absent
    /// from the log are inserted as zero-usage entries.
    async fn merge_inventory(&mut self, ctx: &RunContext, collector: &Collector) -> Result<()> {
        let inventory = collector.fetch_table_inventory(ctx).await?;
        let mut zero_usage = 0usize;

        for meta in inventory {
            match self.tables.get_mut(&meta.full_name) {
                Some(existing) => {
                    existing.engine = meta.engine;
                    existing.is_replicated = meta.is_replicated;
                    existing.is_materialized_view = meta.is_materialized_view;
                    existing.dependencies = meta.dependencies;
                    existing.total_bytes = meta.total_bytes;
                    existing.total_rows = meta.total_rows;
                    existing.created_at = meta.created_at;
                    existing.zero_usage = false;
                }
                None => {
                    let mut table = meta;
                    table.zero_usage = true;
                    self.tables.insert(table.full_name.clone(), table);
                    zero_usage += 1;
                }
            }
        }

        debug!(
            total = self.tables.len(),
            zero_usage, "merged table inventory"
        );
        Ok(())
    }

    /// Analyzed tables, keyed by `database.name`.
    pub fn tables(&self) -> &HashMap<String, Table> {
        &self.tables
    }

    /// Mutable access for the scorer.
    pub fn tables_mut(&mut self) -> &mut HashMap<String, Table> {
        &mut self.tables
    }

    /// Split view for the scorer: mutable tables plus read-only clients.
    pub fn scoring_views(&mut self) -> (&mut HashMap<String, Table>, &HashMap<String, Client>) {
        (&mut self.tables, &self.clients)
    }

    /// Analyzed clients, keyed by raw address.
    pub fn clients(&self) -> &HashMap<String, Client> {
        &self.clients
    }

    /// Client→table edges, unordered.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Detected anomalies.
    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }
}
