//! Configuration types and management for clickspectre.
//!
//! The runtime [`Config`] is an immutable snapshot threaded explicitly
//! through every component; nothing reads process-wide state. Values layer
//! as defaults < config file < CLI flags, with validation running before
//! any I/O.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SpectreError};

/// Canonical config filename.
pub const DEFAULT_CONFIG_FILE_YAML: &str = ".clickspectre.yaml";
/// Compatible alternate config filename.
pub const DEFAULT_CONFIG_FILE_YML: &str = ".clickspectre.yml";

static DURATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)([smhd])$").expect("duration pattern is valid"));

/// Parse a duration string with support for days.
///
/// Supports `s` (seconds), `m` (minutes), `h` (hours), `d` (days), e.g.
/// `30d`, `168h`, `5m`, `30s`.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    let captures = DURATION_PATTERN.captures(trimmed).ok_or_else(|| {
        SpectreError::config(format!(
            "invalid duration {trimmed:?}: expected <number><s|m|h|d>"
        ))
    })?;

    let amount: u64 = captures[1]
        .parse()
        .map_err(|_| SpectreError::config(format!("invalid duration value: {}", &captures[1])))?;

    let seconds = match &captures[2] {
        "s" => amount,
        "m" => amount * 60,
        "h" => amount * 3600,
        "d" => amount * 86_400,
        unit => return Err(SpectreError::config(format!("unknown time unit: {unit}"))),
    };

    Ok(Duration::from_secs(seconds))
}

/// Report output formats understood by the emitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Machine-readable JSON report
    Json,
    /// Human-readable text summary
    Text,
    /// SARIF 2.1.0 findings document
    Sarif,
}

impl ReportFormat {
    /// Parse a format name, case-insensitively.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            "sarif" => Ok(Self::Sarif),
            other => Err(SpectreError::config_field(
                format!("unsupported format {other:?}"),
                "format",
            )),
        }
    }
}

/// Immutable runtime configuration consumed by every component.
#[derive(Debug, Clone)]
pub struct Config {
    /// ClickHouse connection string
    pub dsn: String,
    /// How far back to scan the query log
    pub lookback: Duration,
    /// Deadline across all query-log batches
    pub query_timeout: Duration,
    /// Query-log page size
    pub batch_size: u64,
    /// Upper bound on delivered log rows
    pub max_rows: u64,
    /// Parallelism for resolver prefetch
    pub concurrency: usize,

    /// Resolve client addresses to workload identities
    pub resolve_workloads: bool,
    /// Resolver cache TTL
    pub resolver_cache_ttl: Duration,
    /// Resolver rate limit (requests per second)
    pub resolver_rate_limit: u32,

    /// Fetch the table catalog and flag zero-usage tables
    pub detect_unused_tables: bool,
    /// Minimum table size for zero-usage recommendations (MB)
    pub min_table_size_mb: f64,
    /// Demote tables below this query count to likely-safe (0 disables)
    pub min_query_count: u64,

    /// Glob patterns excluding `database.table` identifiers
    pub exclude_tables: Vec<String>,
    /// Glob patterns excluding whole databases
    pub exclude_databases: Vec<String>,

    /// Run the anomaly detector
    pub anomaly_detection: bool,
    /// Materialize MV dependency lists in the output
    pub include_mv_deps: bool,
    /// Scoring algorithm name (currently only "simple")
    pub scoring_algorithm: String,

    /// Baseline file path; `None` means no suppression
    pub baseline_path: Option<PathBuf>,
    /// Merge current findings into the baseline and save
    pub update_baseline: bool,

    /// Report output directory
    pub output_dir: PathBuf,
    /// Report format
    pub format: ReportFormat,
    /// Analyze but skip report emission
    pub dry_run: bool,
    /// Verbose logging
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            lookback: Duration::from_secs(30 * 86_400),
            query_timeout: Duration::from_secs(5 * 60),
            batch_size: 100_000,
            max_rows: 1_000_000,
            concurrency: 5,
            resolve_workloads: false,
            resolver_cache_ttl: Duration::from_secs(5 * 60),
            resolver_rate_limit: 10,
            detect_unused_tables: false,
            min_table_size_mb: 1.0,
            min_query_count: 0,
            exclude_tables: Vec::new(),
            exclude_databases: Vec::new(),
            anomaly_detection: true,
            include_mv_deps: true,
            scoring_algorithm: "simple".to_string(),
            baseline_path: None,
            update_baseline: false,
            output_dir: PathBuf::from("./report"),
            format: ReportFormat::Json,
            dry_run: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Lookback window expressed in whole days.
    pub fn lookback_days(&self) -> u32 {
        (self.lookback.as_secs() / 86_400) as u32
    }

    /// Validate configuration settings. Runs before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.dsn.trim().is_empty() {
            return Err(SpectreError::config_field(
                "ClickHouse DSN is required",
                "dsn",
            ));
        }

        if self.lookback < Duration::from_secs(86_400) {
            return Err(SpectreError::config_field(
                "lookback must be at least one day",
                "lookback",
            ));
        }

        if self.batch_size == 0 {
            return Err(SpectreError::config_field(
                "batch_size must be greater than 0",
                "batch_size",
            ));
        }

        if self.max_rows == 0 {
            return Err(SpectreError::config_field(
                "max_rows must be greater than 0",
                "max_rows",
            ));
        }

        if self.concurrency == 0 {
            return Err(SpectreError::config_field(
                "concurrency must be greater than 0",
                "concurrency",
            ));
        }

        if self.resolve_workloads && self.resolver_rate_limit == 0 {
            return Err(SpectreError::config_field(
                "resolver_rate_limit must be greater than 0",
                "resolver_rate_limit",
            ));
        }

        if self.min_table_size_mb < 0.0 {
            return Err(SpectreError::config_field(
                "min_table_size must be non-negative",
                "min_table_size",
            ));
        }

        Ok(())
    }

    /// Fold file-level values into this configuration. CLI flags are applied
    /// after this, so explicit flags always win.
    pub fn apply_file(&mut self, file: &FileConfig) -> Result<()> {
        if let Some(dsn) = file.endpoint() {
            if self.dsn.is_empty() {
                self.dsn = dsn.to_string();
            }
        }

        if !file.exclude_tables.is_empty() {
            self.exclude_tables = file.exclude_tables.clone();
        }
        if !file.exclude_databases.is_empty() {
            self.exclude_databases = file.exclude_databases.clone();
        }

        if let Some(min_query_count) = file.min_query_count {
            self.min_query_count = min_query_count;
        }
        if let Some(min_table_size) = file.min_table_size {
            self.min_table_size_mb = min_table_size;
        }

        if let Some(format) = file.format.as_deref() {
            self.format = ReportFormat::parse(format)?;
        }

        if let Some(timeout) = file.query_timeout_value() {
            self.query_timeout = parse_duration(timeout)?;
        }

        Ok(())
    }
}

/// Values loaded from a `.clickspectre.yaml` file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    /// ClickHouse endpoint (URL form)
    #[serde(default)]
    pub clickhouse_url: Option<String>,
    /// ClickHouse endpoint (DSN form); wins over `clickhouse_url`
    #[serde(default)]
    pub clickhouse_dsn: Option<String>,
    /// Table exclusion globs
    #[serde(default)]
    pub exclude_tables: Vec<String>,
    /// Database exclusion globs
    #[serde(default)]
    pub exclude_databases: Vec<String>,
    /// Minimum query count floor
    #[serde(default)]
    pub min_query_count: Option<u64>,
    /// Report format name
    #[serde(default)]
    pub format: Option<String>,
    /// Query timeout (short form)
    #[serde(default)]
    pub timeout: Option<String>,
    /// Query timeout (long form); `timeout` wins when both are set
    #[serde(default)]
    pub query_timeout: Option<String>,
    /// Minimum table size in MB for zero-usage recommendations
    #[serde(default, rename = "min_table_size")]
    pub min_table_size: Option<f64>,
}

impl FileConfig {
    /// First configured ClickHouse endpoint, DSN form preferred.
    pub fn endpoint(&self) -> Option<&str> {
        non_empty(self.clickhouse_dsn.as_deref()).or_else(|| non_empty(self.clickhouse_url.as_deref()))
    }

    /// Query timeout from the `timeout`/`query_timeout` fields.
    pub fn query_timeout_value(&self) -> Option<&str> {
        non_empty(self.timeout.as_deref()).or_else(|| non_empty(self.query_timeout.as_deref()))
    }

    /// Trim and drop empty list entries.
    pub fn normalize(&mut self) {
        self.exclude_tables = normalize_list(&self.exclude_tables);
        self.exclude_databases = normalize_list(&self.exclude_databases);
    }

    /// Load config values from a specific YAML file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SpectreError::io(format!("failed to read config file {}", path.display()), e)
        })?;

        let mut config: Self = serde_yaml::from_str(&content)?;
        config.normalize();
        Ok(config)
    }

    /// Discover and load the first available config file: working directory
    /// first, then the home directory. Returns the loaded config and its
    /// path, or `None` when no candidate exists.
    pub fn autoload() -> Result<Option<(Self, PathBuf)>> {
        let mut candidates = vec![
            PathBuf::from(DEFAULT_CONFIG_FILE_YAML),
            PathBuf::from(DEFAULT_CONFIG_FILE_YML),
        ];

        if let Some(home) = std::env::var_os("HOME") {
            let home = PathBuf::from(home);
            candidates.push(home.join(DEFAULT_CONFIG_FILE_YAML));
            candidates.push(home.join(DEFAULT_CONFIG_FILE_YML));
        }

        for candidate in candidates {
            if candidate.is_file() {
                let config = Self::load(&candidate)?;
                return Ok(Some((config, candidate)));
            }
        }

        Ok(None)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn normalize_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}
