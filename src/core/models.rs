//! Entity models and the report value object.
//!
//! Tables, clients, and edges are mutated during the analyzer fold; the
//! report snapshot is a deep copy, so downstream code can never reach back
//! into the analyzer's maps.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry from the query-execution log. Transient: produced by the
/// collector, folded into the entity models, then discarded.
#[derive(Debug, Clone)]
pub struct LogRow {
    /// Unique query identifier
    pub query_id: String,
    /// Log entry type (only completed entries are collected)
    pub entry_type: String,
    /// Event time (UTC, second resolution)
    pub event_time: DateTime<Utc>,
    /// Query kind used for read/write classification
    pub query_kind: String,
    /// Raw query text, truncated at 100k bytes
    pub query: String,
    /// Query user, passed through untouched
    pub user: String,
    /// Client address as reported by the server
    pub client_address: String,
    /// Rows read by the query
    pub read_rows: u64,
    /// Rows written by the query
    pub written_rows: u64,
    /// Query duration
    pub duration: Duration,
    /// Exception text, if any
    pub exception: String,
    /// Table references extracted from the query text
    pub tables: Vec<String>,
}

/// One row of the table catalog. Transient: produced by the catalog
/// collector, consumed by the inventory merge.
#[derive(Debug, Clone)]
pub struct CatalogRow {
    /// Database name
    pub database: String,
    /// Table name
    pub name: String,
    /// Engine string
    pub engine: String,
    /// Table size in bytes (null mapped to 0)
    pub total_bytes: u64,
    /// Table row count (null mapped to 0)
    pub total_rows: u64,
    /// Catalog modification time, used as creation-time surrogate
    pub created_at: Option<DateTime<Utc>>,
    /// Dependent objects as `database.name` strings
    pub dependencies: Vec<String>,
}

impl CatalogRow {
    /// Display identifier `database.name`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    /// Whether the engine indicates a replicated table.
    pub fn is_replicated(&self) -> bool {
        self.engine.contains("Replicated")
    }

    /// Whether the engine indicates a materialized view.
    pub fn is_materialized_view(&self) -> bool {
        self.engine.starts_with("Materialized")
    }
}

/// One hour-bucketed activity sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Bucket start, truncated to the hour
    pub timestamp: DateTime<Utc>,
    /// Number of queries that referenced the table in this bucket
    pub value: u64,
}

/// Cleanup-safety category assigned by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Table is in active use; keep
    Active,
    /// Low signal; needs review before cleanup
    Suspect,
    /// No meaningful usage observed
    Unused,
}

impl Category {
    /// Stable string form used in text output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspect => "suspect",
            Self::Unused => "unused",
        }
    }
}

/// A ClickHouse table with accumulated usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name without the database part
    pub name: String,
    /// Database name (empty when the reference carried no database)
    pub database: String,
    /// Display identifier `database.name`
    pub full_name: String,
    /// Rows read from this table over the lookback window
    pub reads: u64,
    /// Rows written to this table over the lookback window
    pub writes: u64,
    /// Most recent log event referencing the table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_access: Option<DateTime<Utc>>,
    /// Earliest log event referencing the table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    /// Hour-bucketed query counts, ascending by timestamp
    pub activity_series: Vec<TimeSeriesPoint>,
    /// Cleanup-safety score in [0, 1]
    pub score: f64,
    /// Scorer category; absent until scored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// Engine string from the catalog
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub engine: String,
    /// Derived: engine contains "Replicated"
    pub is_replicated: bool,
    /// Derived: engine begins with "Materialized"
    pub is_materialized_view: bool,
    /// Dependent objects as `database.name` strings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Table size in bytes
    pub total_bytes: u64,
    /// Table row count
    pub total_rows: u64,
    /// Creation-time surrogate from the catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Present in the catalog but never seen in the query log
    pub zero_usage: bool,
}

impl Table {
    /// Create an empty table from a `[database.]name` identifier.
    pub fn new(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let (database, name) = match full_name.split_once('.') {
            Some((db, table)) => (db.to_string(), table.to_string()),
            None => (String::new(), full_name.clone()),
        };

        Self {
            name,
            database,
            full_name,
            reads: 0,
            writes: 0,
            last_access: None,
            first_seen: None,
            activity_series: Vec::new(),
            score: 0.0,
            category: None,
            engine: String::new(),
            is_replicated: false,
            is_materialized_view: false,
            dependencies: Vec::new(),
            total_bytes: 0,
            total_rows: 0,
            created_at: None,
            zero_usage: false,
        }
    }

    /// Table size in megabytes.
    pub fn size_mb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Query count used by the minimum-query floor: the activity-series sum
    /// when a series is present, else `reads + writes`.
    pub fn query_count(&self) -> u64 {
        if self.activity_series.is_empty() {
            self.reads + self.writes
        } else {
            self.activity_series.iter().map(|p| p.value).sum()
        }
    }

    /// Days since the table was last accessed, relative to `now`. Tables
    /// never seen in the log report an unbounded staleness.
    pub fn days_since_access(&self, now: DateTime<Utc>) -> f64 {
        match self.last_access {
            Some(last) => (now - last).num_seconds() as f64 / 86_400.0,
            None => f64::INFINITY,
        }
    }
}

/// Resolved workload identity for a client address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    /// Workload name (falls back to the raw address on resolution failure)
    pub name: String,
    /// Workload group (namespace, team, or similar)
    pub group: String,
    /// Concrete instance behind the address
    pub instance: String,
}

impl WorkloadIdentity {
    /// Synthetic identity used when resolution fails: the name is the raw
    /// address and the group/instance are empty.
    pub fn fallback(address: impl Into<String>) -> Self {
        Self {
            name: address.into(),
            group: String::new(),
            instance: String::new(),
        }
    }
}

/// A client workload observed in the query log, keyed by raw address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Raw client address from the log
    pub address: String,
    /// Resolved workload identity, when resolution succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload: Option<WorkloadIdentity>,
    /// Distinct `database.name` values used, in first-appearance order
    pub tables_used: Vec<String>,
    /// Queries issued over the lookback window
    pub query_count: u64,
    /// Most recent log event for this client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Client {
    /// Create an empty client for an address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            workload: None,
            tables_used: Vec::new(),
            query_count: 0,
            last_seen: None,
        }
    }

    /// Display name: the resolved workload name when present, else the raw
    /// address.
    pub fn display_name(&self) -> &str {
        match &self.workload {
            Some(workload) if !workload.name.is_empty() => &workload.name,
            _ => &self.address,
        }
    }
}

/// A client→table relationship aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Raw client address
    pub client_address: String,
    /// Display name for the client at fold time
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// Display identifier of the table
    pub table: String,
    /// Rows read across this edge
    pub reads: u64,
    /// Rows written across this edge
    pub writes: u64,
    /// Most recent activity on this edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

/// Anomaly rule identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Table accessed exactly once in the lookback window
    SingleAccess,
    /// Table not accessed in over 30 days
    StaleTable,
    /// Table has writes but no reads
    WriteOnly,
    /// Table has many reads but no writes
    ReadOnly,
    /// Table has very low activity and is going stale
    LowActivity,
    /// Client accesses an unusually broad set of tables
    BroadAccess,
}

impl AnomalyKind {
    /// Stable string form used in fingerprints and SARIF output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleAccess => "single_access",
            Self::StaleTable => "stale_table",
            Self::WriteOnly => "write_only",
            Self::ReadOnly => "read_only",
            Self::LowActivity => "low_activity",
            Self::BroadAccess => "broad_access",
        }
    }
}

/// Anomaly severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Low,
    /// Worth a look
    Medium,
    /// Needs attention
    High,
}

impl Severity {
    /// Stable string form used in fingerprints and SARIF output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// An unusual access pattern flagged by the anomaly detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// Rule that fired
    pub kind: AnomalyKind,
    /// Severity of the finding
    pub severity: Severity,
    /// Human-readable description
    pub description: String,
    /// Affected table, for table-level rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_table: Option<String>,
    /// Affected client address, for client-level rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_client: Option<String>,
    /// Wall clock at detection; not stable across runs
    pub detected_at: DateTime<Utc>,
}

/// A zero-usage recommendation carrying full table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRecommendation {
    /// Display identifier `database.name`
    pub name: String,
    /// Database name
    pub database: String,
    /// Engine string
    pub engine: String,
    /// Derived replication flag
    pub is_replicated: bool,
    /// Table size in megabytes
    pub size_mb: f64,
    /// Table row count
    pub total_rows: u64,
}

/// Cleanup recommendations grouped by safety bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recommendations {
    /// Zero-usage tables on non-replicated engines, size-descending
    pub zero_usage_non_replicated: Vec<TableRecommendation>,
    /// Zero-usage tables on replicated engines, size-descending
    pub zero_usage_replicated: Vec<TableRecommendation>,
    /// Tables scored unused and past all safety gates
    pub safe_to_drop: Vec<String>,
    /// Tables needing review before cleanup
    pub likely_safe: Vec<String>,
    /// Tables in active use or protected by a safety gate
    pub keep: Vec<String>,
}

impl Recommendations {
    /// Number of recommendations that count as findings (everything except
    /// the keep bucket).
    pub fn finding_count(&self) -> usize {
        self.zero_usage_non_replicated.len()
            + self.zero_usage_replicated.len()
            + self.safe_to_drop.len()
            + self.likely_safe.len()
    }
}

/// Report generation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Lookback window in days
    pub lookback_days: u32,
    /// Database host the analysis ran against
    pub clickhouse_host: String,
    /// Raw log rows delivered by the collector
    pub total_queries_analyzed: u64,
    /// Wall-clock analysis duration, e.g. "12s"
    pub analysis_duration: String,
    /// Whether workload resolution was enabled
    pub resolve_workloads: bool,
    /// Whether zero-usage detection was enabled
    pub detect_unused_tables: bool,
    /// Whether anomaly detection was enabled
    pub anomaly_detection: bool,
}

/// The complete analysis output. A pure value object: building it clones
/// entity state, and emitters only read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Tool name
    pub tool: String,
    /// Tool version
    pub version: String,
    /// Generation timestamp (UTC, RFC 3339)
    pub generated_at: DateTime<Utc>,
    /// Run metadata
    pub metadata: ReportMetadata,
    /// Table snapshots, ordered by full name
    pub tables: Vec<Table>,
    /// Client snapshots, ordered by address
    pub clients: Vec<Client>,
    /// Edge snapshots, ordered by (client, table)
    pub edges: Vec<Edge>,
    /// Detected anomalies
    pub anomalies: Vec<Anomaly>,
    /// Cleanup recommendations
    pub recommendations: Recommendations,
}

impl Report {
    /// Total number of findings: all recommendation buckets except keep,
    /// plus anomalies.
    pub fn finding_count(&self) -> usize {
        self.anomalies.len() + self.recommendations.finding_count()
    }
}
