//! Query-log and table-catalog extraction.
//!
//! The [`LogStore`] trait is the seam between the collector and the
//! database: the production implementation speaks to ClickHouse, while
//! tests script pages and failures. The [`Collector`] drives pagination,
//! the per-batch retry envelope, row validation, and table-reference
//! extraction.

pub mod clickhouse;
pub mod extract;
pub mod retry;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::core::config::Config;
use crate::core::context::RunContext;
use crate::core::errors::{Result, SpectreError};
use crate::core::exclude::ExclusionFilter;
use crate::core::models::{CatalogRow, LogRow, Table};
use crate::collector::retry::{execute_with_retry, RetryPolicy};

/// Query text longer than this is truncated before analysis.
const MAX_QUERY_BYTES: usize = 100_000;
/// Suffix appended to truncated query text.
const TRUNCATION_SUFFIX: &str = "... [truncated]";
/// Deadline for a single catalog query.
const CATALOG_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// A raw query-log row before validation and extraction.
#[derive(Debug, Clone)]
pub struct RawLogRow {
    /// Unique query identifier
    pub query_id: String,
    /// Log entry type
    pub entry_type: String,
    /// Event time as epoch seconds
    pub event_time: i64,
    /// Query kind string
    pub query_kind: String,
    /// Raw query text
    pub query: String,
    /// Query user
    pub user: String,
    /// Client address cast to a string by the server
    pub client_address: String,
    /// Rows read
    pub read_rows: u64,
    /// Rows written
    pub written_rows: u64,
    /// Query duration in milliseconds
    pub duration_ms: u64,
    /// Exception text
    pub exception: String,
}

/// Outcome of decoding one row from the result stream.
pub type RowScan = std::result::Result<RawLogRow, String>;

/// One page of the query log.
///
/// `iteration_error` reports a stream failure that occurred after some rows
/// were already produced; an empty page with an iteration error means the
/// stream failed before yielding anything.
#[derive(Debug, Default)]
pub struct LogPage {
    /// Per-row scan outcomes in stream order
    pub rows: Vec<RowScan>,
    /// Stream-level failure, if the iterator died mid-page
    pub iteration_error: Option<SpectreError>,
}

/// Storage backend for the query log and table catalog.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Fetch one page of completed query-log entries within the lookback
    /// window, ordered by event time descending.
    async fn fetch_log_page(
        &self,
        ctx: &RunContext,
        lookback_days: u32,
        limit: u64,
        offset: u64,
    ) -> Result<LogPage>;

    /// Fetch the full user-table inventory, excluding system catalogs.
    async fn fetch_catalog(&self, ctx: &RunContext) -> Result<Vec<CatalogRow>>;
}

/// Collection counters reported after a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectStats {
    /// Rows delivered to the analyzer
    pub collected: u64,
    /// Rows dropped by scan failures or empty essential fields
    pub skipped_rows: u64,
    /// Pages fetched
    pub batches: u32,
}

/// Paginated, retry-bounded query-log collector.
pub struct Collector {
    config: Arc<Config>,
    store: Arc<dyn LogStore>,
    filter: ExclusionFilter,
    policy: RetryPolicy,
}

impl Collector {
    /// Create a collector over a storage backend.
    pub fn new(config: Arc<Config>, store: Arc<dyn LogStore>, filter: ExclusionFilter) -> Self {
        Self {
            config,
            store,
            filter,
            policy: RetryPolicy::default(),
        }
    }

    /// Collect query-log rows across the lookback window.
    ///
    /// Pagination stops when a page comes back short, the row budget is
    /// reached, the context is cancelled, or a batch exhausts its retries.
    /// A row stream that fails after yielding rows is recovered softly: the
    /// rows collected so far are returned without an error.
    pub async fn collect(&self, ctx: &RunContext) -> Result<(Vec<LogRow>, CollectStats)> {
        let ctx = ctx.with_timeout(self.config.query_timeout);
        let lookback_days = self.config.lookback_days();
        let batch_size = self.config.batch_size;

        let mut rows = Vec::new();
        let mut stats = CollectStats::default();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut logged_scan_error = false;
        let mut offset = 0u64;

        loop {
            let page = {
                let store = Arc::clone(&self.store);
                let batch_ctx = ctx.clone();
                execute_with_retry(&ctx, &self.policy, move || {
                    let store = Arc::clone(&store);
                    let ctx = batch_ctx.clone();
                    async move {
                        store
                            .fetch_log_page(&ctx, lookback_days, batch_size, offset)
                            .await
                    }
                })
                .await?
            };
            stats.batches += 1;

            let page_len = page.rows.len() as u64;
            if let Some(iteration_error) = &page.iteration_error {
                if page.rows.is_empty() {
                    return Err(SpectreError::network(format!(
                        "row iteration failed before any rows at offset {offset}: {iteration_error}"
                    )));
                }
                warn!(
                    offset,
                    recovered = page.rows.len(),
                    error = %iteration_error,
                    "row iteration failed mid-page, keeping rows collected so far"
                );
            }
            let soft_recovered = page.iteration_error.is_some();

            for scan in page.rows {
                match self.process_row(scan, &mut seen_ids, &mut logged_scan_error) {
                    Some(row) => {
                        rows.push(row);
                        stats.collected += 1;
                    }
                    None => stats.skipped_rows += 1,
                }
            }

            if soft_recovered {
                break;
            }
            if stats.collected >= self.config.max_rows {
                debug!(
                    max_rows = self.config.max_rows,
                    "row budget reached, stopping collection"
                );
                break;
            }
            if page_len < batch_size {
                break;
            }

            offset += batch_size;
        }

        if stats.skipped_rows > 0 {
            warn!(
                skipped = stats.skipped_rows,
                collected = stats.collected,
                "skipped problematic query-log rows"
            );
        }
        debug!(
            collected = stats.collected,
            batches = stats.batches,
            "query-log collection finished"
        );

        Ok((rows, stats))
    }

    /// Fetch the table inventory, derive engine flags, and apply the
    /// exclusion filter. Returned tables carry an empty (non-null) activity
    /// series so serialization stays consistent.
    pub async fn fetch_table_inventory(&self, ctx: &RunContext) -> Result<Vec<Table>> {
        let ctx = ctx.with_timeout(CATALOG_QUERY_TIMEOUT);
        let rows = self.store.fetch_catalog(&ctx).await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let full_name = row.full_name();
            if self.filter.is_database_excluded(&row.database)
                || self.filter.is_table_excluded(&full_name)
            {
                continue;
            }

            let mut table = Table::new(full_name);
            table.is_replicated = row.is_replicated();
            table.is_materialized_view = row.is_materialized_view();
            table.engine = row.engine;
            table.total_bytes = row.total_bytes;
            table.total_rows = row.total_rows;
            table.created_at = row.created_at;
            table.dependencies = row.dependencies;
            tables.push(table);
        }

        Ok(tables)
    }

    fn process_row(
        &self,
        scan: RowScan,
        seen_ids: &mut HashSet<String>,
        logged_scan_error: &mut bool,
    ) -> Option<LogRow> {
        let raw = match scan {
            Ok(raw) => raw,
            Err(scan_error) => {
                if !*logged_scan_error {
                    *logged_scan_error = true;
                    error!(
                        error = %scan_error,
                        "failed to scan query-log row; this suggests a column type mismatch"
                    );
                }
                return None;
            }
        };

        if raw.query_id.is_empty() || raw.query.is_empty() {
            return None;
        }
        if !seen_ids.insert(raw.query_id.clone()) {
            return None;
        }

        let mut query = raw.query;
        if query.len() > MAX_QUERY_BYTES {
            query = truncate_query(&query);
        }

        let mut tables = extract::extract_tables_safe(&query);
        tables.retain(|t| !self.filter.is_table_excluded(t));

        let event_time = chrono::DateTime::from_timestamp(raw.event_time, 0)
            .unwrap_or_else(chrono::Utc::now);

        Some(LogRow {
            query_id: raw.query_id,
            entry_type: raw.entry_type,
            event_time,
            query_kind: raw.query_kind,
            query,
            user: raw.user,
            client_address: raw.client_address,
            read_rows: raw.read_rows,
            written_rows: raw.written_rows,
            duration: Duration::from_millis(raw.duration_ms),
            exception: raw.exception,
            tables,
        })
    }
}

/// Truncate query text at the byte budget without splitting a UTF-8
/// character, appending the truncation marker.
fn truncate_query(query: &str) -> String {
    let mut cut = MAX_QUERY_BYTES;
    while cut > 0 && !query.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &query[..cut], TRUNCATION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    fn raw_row(query_id: &str, query: &str) -> RawLogRow {
        RawLogRow {
            query_id: query_id.to_string(),
            entry_type: "QueryFinish".to_string(),
            event_time: 1_718_000_000,
            query_kind: "Select".to_string(),
            query: query.to_string(),
            user: "default".to_string(),
            client_address: "10.0.0.1".to_string(),
            read_rows: 10,
            written_rows: 0,
            duration_ms: 12,
            exception: String::new(),
        }
    }

    /// Scripted backend: each call pops the next page outcome.
    struct ScriptedStore {
        pages: Mutex<Vec<Result<LogPage>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedStore {
        fn new(pages: Vec<Result<LogPage>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LogStore for ScriptedStore {
        async fn fetch_log_page(
            &self,
            _ctx: &RunContext,
            _lookback_days: u32,
            _limit: u64,
            _offset: u64,
        ) -> Result<LogPage> {
            *self.calls.lock().unwrap() += 1;
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                return Ok(LogPage::default());
            }
            pages.remove(0)
        }

        async fn fetch_catalog(&self, _ctx: &RunContext) -> Result<Vec<CatalogRow>> {
            Ok(Vec::new())
        }
    }

    fn collector_over(store: Arc<ScriptedStore>, config: Config) -> Collector {
        let filter = ExclusionFilter::new(&config.exclude_tables, &config.exclude_databases);
        Collector::new(Arc::new(config), store, filter)
    }

    fn small_batch_config() -> Config {
        Config {
            dsn: "http://localhost:8123".into(),
            batch_size: 2,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn collects_and_extracts_tables() {
        let page = LogPage {
            rows: vec![Ok(raw_row("q1", "SELECT * FROM db.events"))],
            iteration_error: None,
        };
        let collector = collector_over(Arc::new(ScriptedStore::new(vec![Ok(page)])), small_batch_config());

        let (rows, stats) = collector.collect(&RunContext::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tables, vec!["db.events"]);
        assert_eq!(stats.collected, 1);
        assert_eq!(stats.skipped_rows, 0);
    }

    #[tokio::test]
    async fn paginates_until_short_page() {
        let pages = vec![
            Ok(LogPage {
                rows: vec![
                    Ok(raw_row("q1", "SELECT * FROM db.a")),
                    Ok(raw_row("q2", "SELECT * FROM db.b")),
                ],
                iteration_error: None,
            }),
            Ok(LogPage {
                rows: vec![Ok(raw_row("q3", "SELECT * FROM db.c"))],
                iteration_error: None,
            }),
        ];
        let store = Arc::new(ScriptedStore::new(pages));
        let collector = collector_over(store, small_batch_config());

        let (rows, stats) = collector.collect(&RunContext::new()).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(stats.batches, 2);
    }

    #[tokio::test]
    async fn stops_at_row_budget() {
        let config = Config {
            max_rows: 2,
            ..small_batch_config()
        };
        let pages = vec![
            Ok(LogPage {
                rows: vec![
                    Ok(raw_row("q1", "SELECT * FROM db.a")),
                    Ok(raw_row("q2", "SELECT * FROM db.b")),
                ],
                iteration_error: None,
            }),
            // Never reached: the budget is already spent.
            Ok(LogPage {
                rows: vec![Ok(raw_row("q3", "SELECT * FROM db.c"))],
                iteration_error: None,
            }),
        ];
        let store = Arc::new(ScriptedStore::new(pages));
        let collector = collector_over(store, config);

        let (rows, stats) = collector.collect(&RunContext::new()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(stats.batches, 1);
    }

    #[tokio::test]
    async fn skips_rows_with_empty_essential_fields() {
        let page = LogPage {
            rows: vec![
                Ok(raw_row("", "SELECT * FROM db.a")),
                Ok(raw_row("q2", "")),
                Ok(raw_row("q3", "SELECT * FROM db.c")),
            ],
            iteration_error: None,
        };
        let config = Config {
            batch_size: 3,
            dsn: "http://localhost:8123".into(),
            ..Config::default()
        };
        let collector = collector_over(Arc::new(ScriptedStore::new(vec![Ok(page)])), config);

        let (rows, stats) = collector.collect(&RunContext::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(stats.skipped_rows, 2);
    }

    #[tokio::test]
    async fn scan_failures_are_counted_and_skipped() {
        let page = LogPage {
            rows: vec![
                Err("cannot decode column 'read_rows'".to_string()),
                Ok(raw_row("q2", "SELECT * FROM db.b")),
            ],
            iteration_error: None,
        };
        let collector = collector_over(Arc::new(ScriptedStore::new(vec![Ok(page)])), small_batch_config());

        let (rows, stats) = collector.collect(&RunContext::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(stats.skipped_rows, 1);
    }

    #[tokio::test]
    async fn deduplicates_rows_across_pages() {
        let pages = vec![
            Ok(LogPage {
                rows: vec![
                    Ok(raw_row("q1", "SELECT * FROM db.a")),
                    Ok(raw_row("q2", "SELECT * FROM db.b")),
                ],
                iteration_error: None,
            }),
            Ok(LogPage {
                rows: vec![Ok(raw_row("q2", "SELECT * FROM db.b"))],
                iteration_error: None,
            }),
        ];
        let collector = collector_over(Arc::new(ScriptedStore::new(pages)), small_batch_config());

        let (rows, _) = collector.collect(&RunContext::new()).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn soft_recovery_keeps_partial_page() {
        let page = LogPage {
            rows: vec![Ok(raw_row("q1", "SELECT * FROM db.a"))],
            iteration_error: Some(SpectreError::network("connection reset mid-stream")),
        };
        let collector = collector_over(Arc::new(ScriptedStore::new(vec![Ok(page)])), small_batch_config());

        let (rows, _) = collector.collect(&RunContext::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn iteration_error_before_any_rows_is_fatal() {
        let page = LogPage {
            rows: Vec::new(),
            iteration_error: Some(SpectreError::network("connection reset")),
        };
        let collector = collector_over(Arc::new(ScriptedStore::new(vec![Ok(page)])), small_batch_config());

        let err = collector.collect(&RunContext::new()).await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_batch_failure_retries_then_succeeds() {
        let pages = vec![
            Err(SpectreError::from_backend("read tcp: i/o timeout")),
            Ok(LogPage {
                rows: vec![Ok(raw_row("q1", "SELECT * FROM db.a"))],
                iteration_error: None,
            }),
        ];
        let store = Arc::new(ScriptedStore::new(pages));
        let collector = collector_over(Arc::clone(&store), small_batch_config());

        let started = tokio::time::Instant::now();
        let (rows, _) = collector.collect(&RunContext::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.call_count(), 2);
        assert_eq!(started.elapsed(), std::time::Duration::from_millis(100));
    }

    #[tokio::test]
    async fn auth_failure_attempts_once_and_fails() {
        let pages = vec![Err(SpectreError::from_backend(
            "code: 516, message: Authentication failed",
        ))];
        let store = Arc::new(ScriptedStore::new(pages));
        let collector = collector_over(Arc::clone(&store), small_batch_config());

        let ctx = RunContext::new();
        let err = collector.collect(&ctx).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn excluded_tables_are_dropped_from_rows() {
        let page = LogPage {
            rows: vec![Ok(raw_row("q1", "SELECT * FROM tmp.scratch JOIN db.real ON 1"))],
            iteration_error: None,
        };
        let config = Config {
            exclude_databases: vec!["tmp".into()],
            ..small_batch_config()
        };
        let collector = collector_over(Arc::new(ScriptedStore::new(vec![Ok(page)])), config);

        let (rows, _) = collector.collect(&RunContext::new()).await.unwrap();
        assert_eq!(rows[0].tables, vec!["db.real"]);
    }

    #[tokio::test]
    async fn long_query_text_is_truncated() {
        let long_query = format!("SELECT * FROM db.a WHERE x = '{}'", "a".repeat(120_000));
        let page = LogPage {
            rows: vec![Ok(raw_row("q1", &long_query))],
            iteration_error: None,
        };
        let collector = collector_over(Arc::new(ScriptedStore::new(vec![Ok(page)])), small_batch_config());

        let (rows, _) = collector.collect(&RunContext::new()).await.unwrap();
        assert!(rows[0].query.ends_with(TRUNCATION_SUFFIX));
        assert_eq!(rows[0].query.len(), MAX_QUERY_BYTES + TRUNCATION_SUFFIX.len());
        assert_eq!(rows[0].tables, vec!["db.a"]);
    }

    #[tokio::test]
    async fn catalog_inventory_applies_exclusions_and_flags() {
        struct CatalogStore;

        #[async_trait]
        impl LogStore for CatalogStore {
            async fn fetch_log_page(
                &self,
                _ctx: &RunContext,
                _lookback_days: u32,
                _limit: u64,
                _offset: u64,
            ) -> Result<LogPage> {
                Ok(LogPage::default())
            }

            async fn fetch_catalog(&self, _ctx: &RunContext) -> Result<Vec<CatalogRow>> {
                Ok(vec![
                    CatalogRow {
                        database: "db".into(),
                        name: "archive".into(),
                        engine: "ReplicatedMergeTree".into(),
                        total_bytes: 1024,
                        total_rows: 10,
                        created_at: None,
                        dependencies: vec!["db.mv".into()],
                    },
                    CatalogRow {
                        database: "tmp".into(),
                        name: "scratch".into(),
                        engine: "Memory".into(),
                        total_bytes: 0,
                        total_rows: 0,
                        created_at: None,
                        dependencies: Vec::new(),
                    },
                ])
            }
        }

        let config = Config {
            exclude_databases: vec!["tmp".into()],
            dsn: "http://localhost:8123".into(),
            ..Config::default()
        };
        let filter = ExclusionFilter::new(&config.exclude_tables, &config.exclude_databases);
        let collector = Collector::new(Arc::new(config), Arc::new(CatalogStore), filter);

        let tables = collector
            .fetch_table_inventory(&RunContext::new())
            .await
            .unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].full_name, "db.archive");
        assert!(tables[0].is_replicated);
        assert!(!tables[0].is_materialized_view);
        assert_eq!(tables[0].dependencies, vec!["db.mv".to_string()]);
        assert!(tables[0].activity_series.is_empty());
    }
}
