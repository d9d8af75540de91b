//! Run orchestration and report assembly.
//!
//! One run: collect log rows, fold the entity models, score and bucket
//! every table, detect anomalies, apply the baseline mode matrix, and
//! assemble the final [`Report`] value. The report is assembled from deep
//! copies in deterministic order, so identical inputs produce identical
//! output and nothing downstream can mutate the analyzer's state.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};
use url::Url;

use crate::analyzer::Analyzer;
use crate::baseline;
use crate::collector::{CollectStats, Collector, LogStore};
use crate::core::config::Config;
use crate::core::context::RunContext;
use crate::core::errors::Result;
use crate::core::exclude::ExclusionFilter;
use crate::core::models::{Recommendations, Report, ReportMetadata};
use crate::core::scoring::generate_recommendations;
use crate::resolver::CachingResolver;
use crate::{TOOL_NAME, VERSION};

/// Result of one analysis run.
#[derive(Debug)]
pub struct AnalysisOutcome {
    /// The assembled report, after any baseline suppression
    pub report: Report,
    /// Findings remaining after suppression; a positive count maps to the
    /// findings-detected exit signal
    pub findings: usize,
    /// Findings removed by baseline suppression
    pub suppressed: usize,
    /// Collection counters
    pub stats: CollectStats,
}

/// Execute the full analysis pipeline against a storage backend.
///
/// The resolver is optional; when absent (or when resolution is disabled)
/// clients keep their raw address identities. Baseline persistence happens
/// before this function returns, so emitter failures cannot double-persist.
pub async fn run_analysis(
    config: Arc<Config>,
    store: Arc<dyn LogStore>,
    resolver: Option<Arc<CachingResolver>>,
    ctx: &RunContext,
) -> Result<AnalysisOutcome> {
    config.validate()?;
    let started = Instant::now();

    let filter = ExclusionFilter::new(&config.exclude_tables, &config.exclude_databases);
    let collector = Collector::new(Arc::clone(&config), store, filter.clone());

    info!(lookback_days = config.lookback_days(), "collecting query log");
    let (rows, stats) = collector.collect(ctx).await?;
    info!(rows = stats.collected, batches = stats.batches, "query log collected");

    let mut analyzer = Analyzer::new(Arc::clone(&config), filter, resolver);
    analyzer.analyze(ctx, &rows, &collector).await?;
    drop(rows);

    let now = Utc::now();
    let recommendations = {
        let (tables, clients) = analyzer.scoring_views();
        generate_recommendations(tables, clients, &config, now)
    };

    let mut report = assemble_report(
        &config,
        &analyzer,
        recommendations,
        stats,
        started.elapsed().as_secs(),
    );

    let suppressed = apply_baseline(&config, &mut report)?;
    let findings = report.finding_count();

    info!(
        host = %report.metadata.clickhouse_host,
        tables = report.tables.len(),
        clients = report.clients.len(),
        queries = report.metadata.total_queries_analyzed,
        findings,
        suppressed,
        "analysis complete"
    );

    Ok(AnalysisOutcome {
        report,
        findings,
        suppressed,
        stats,
    })
}

/// Extract the host from a DSN for report metadata. Unparseable DSNs fall
/// back to the literal "unknown".
pub fn host_from_dsn(dsn: &str) -> String {
    Url::parse(dsn)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn assemble_report(
    config: &Config,
    analyzer: &Analyzer,
    recommendations: Recommendations,
    stats: CollectStats,
    elapsed_secs: u64,
) -> Report {
    let mut tables: Vec<_> = analyzer.tables().values().cloned().collect();
    tables.sort_by(|a, b| a.full_name.cmp(&b.full_name));

    if !config.include_mv_deps {
        for table in &mut tables {
            table.dependencies.clear();
        }
    }

    let mut clients: Vec<_> = analyzer.clients().values().cloned().collect();
    clients.sort_by(|a, b| a.address.cmp(&b.address));

    let mut edges: Vec<_> = analyzer.edges().to_vec();
    edges.sort_by(|a, b| {
        (a.client_address.as_str(), a.table.as_str())
            .cmp(&(b.client_address.as_str(), b.table.as_str()))
    });

    Report {
        tool: TOOL_NAME.to_string(),
        version: VERSION.to_string(),
        generated_at: Utc::now(),
        metadata: ReportMetadata {
            lookback_days: config.lookback_days(),
            clickhouse_host: host_from_dsn(&config.dsn),
            total_queries_analyzed: stats.collected,
            analysis_duration: format!("{elapsed_secs}s"),
            resolve_workloads: config.resolve_workloads,
            detect_unused_tables: config.detect_unused_tables,
            anomaly_detection: config.anomaly_detection,
        },
        tables,
        clients,
        edges,
        anomalies: analyzer.anomalies().to_vec(),
        recommendations,
    }
}

/// Apply the baseline mode matrix.
///
/// | path set | update | action                          |
/// |----------|--------|---------------------------------|
/// | no       | no     | no-op                           |
/// | yes      | no     | load, suppress findings         |
/// | yes      | yes    | load, merge with current, save  |
/// | no       | yes    | default path, merge, save       |
fn apply_baseline(config: &Config, report: &mut Report) -> Result<usize> {
    if config.update_baseline {
        let path = config
            .baseline_path
            .clone()
            .unwrap_or_else(|| baseline::DEFAULT_PATH.into());

        let existing = baseline::load(&path)?;
        let current = baseline::collect_fingerprints(report);
        let merged = baseline::merge(&existing, &current);
        baseline::save(&path, &merged)?;

        info!(
            path = %path.display(),
            fingerprints = merged.len(),
            "baseline updated"
        );
        return Ok(0);
    }

    let Some(path) = &config.baseline_path else {
        return Ok(0);
    };

    let known = baseline::load(path)?;
    let (suppressed, remaining) = baseline::suppress_known(report, &known);
    debug!(suppressed, remaining, "baseline suppression applied");
    Ok(suppressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::models::Recommendations;

    #[test]
    fn host_extraction_from_dsn() {
        assert_eq!(
            host_from_dsn("http://user:pw@ch.prod.internal:8123/db"),
            "ch.prod.internal"
        );
        assert_eq!(host_from_dsn("http://localhost:8123"), "localhost");
        assert_eq!(host_from_dsn("not a url"), "unknown");
        assert_eq!(host_from_dsn(""), "unknown");
    }

    #[test]
    fn snapshot_ordering_is_deterministic() {
        let config = Config {
            dsn: "http://localhost:8123".into(),
            ..Config::default()
        };
        let filter = ExclusionFilter::new(&[], &[]);
        let mut analyzer = Analyzer::new(Arc::new(config.clone()), filter, None);

        for name in ["db.zeta", "db.alpha", "db.mid"] {
            analyzer
                .tables_mut()
                .insert(name.to_string(), crate::core::models::Table::new(name));
        }

        let report = assemble_report(
            &config,
            &analyzer,
            Recommendations::default(),
            CollectStats::default(),
            3,
        );

        let names: Vec<&str> = report.tables.iter().map(|t| t.full_name.as_str()).collect();
        assert_eq!(names, vec!["db.alpha", "db.mid", "db.zeta"]);
        assert_eq!(report.metadata.analysis_duration, "3s");
        assert_eq!(report.tool, "clickspectre");
    }

    #[test]
    fn snapshot_is_a_deep_copy() {
        let config = Config {
            dsn: "http://localhost:8123".into(),
            ..Config::default()
        };
        let filter = ExclusionFilter::new(&[], &[]);
        let mut analyzer = Analyzer::new(Arc::new(config.clone()), filter, None);
        analyzer
            .tables_mut()
            .insert("db.t".to_string(), crate::core::models::Table::new("db.t"));

        let report = assemble_report(
            &config,
            &analyzer,
            Recommendations::default(),
            CollectStats::default(),
            0,
        );

        // Mutating the analyzer after assembly must not affect the report.
        analyzer.tables_mut().get_mut("db.t").unwrap().reads = 999;
        assert_eq!(report.tables[0].reads, 0);
    }

    #[test]
    fn mv_dependency_materialization_can_be_disabled() {
        let config = Config {
            dsn: "http://localhost:8123".into(),
            include_mv_deps: false,
            ..Config::default()
        };
        let filter = ExclusionFilter::new(&[], &[]);
        let mut analyzer = Analyzer::new(Arc::new(config.clone()), filter, None);

        let mut table = crate::core::models::Table::new("db.t");
        table.dependencies = vec!["db.mv".to_string()];
        analyzer.tables_mut().insert("db.t".to_string(), table);

        let report = assemble_report(
            &config,
            &analyzer,
            Recommendations::default(),
            CollectStats::default(),
            0,
        );
        assert!(report.tables[0].dependencies.is_empty());
    }
}
