//! Report emitters.
//!
//! Serialize one [`Report`] value to the configured format. Emitters only
//! read the report; a failure here surfaces after analysis has already
//! succeeded (and after any baseline write).

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::config::ReportFormat;
use crate::core::errors::{Result, SpectreError};
use crate::core::models::{Report, Table};
use crate::io::sarif;

/// Write the report in the requested format and return the output path.
///
/// For the text format the rendered summary is also returned so the CLI can
/// print it.
pub fn write_report(
    report: &Report,
    format: ReportFormat,
    output_dir: &Path,
) -> Result<(PathBuf, Option<String>)> {
    std::fs::create_dir_all(output_dir).map_err(|e| {
        SpectreError::io(
            format!("failed to create output directory {}", output_dir.display()),
            e,
        )
    })?;

    let (path, rendered) = match format {
        ReportFormat::Json => (write_json(report, output_dir)?, None),
        ReportFormat::Text => {
            let (path, rendered) = write_text(report, output_dir)?;
            (path, Some(rendered))
        }
        ReportFormat::Sarif => (sarif::write_sarif(report, output_dir)?, None),
    };

    debug!(path = %path.display(), "report written");
    Ok((path, rendered))
}

/// Write the report as pretty-printed JSON to `report.json`.
pub fn write_json(report: &Report, output_dir: &Path) -> Result<PathBuf> {
    let data = serde_json::to_vec_pretty(report)?;
    let path = output_dir.join("report.json");
    std::fs::write(&path, data)
        .map_err(|e| SpectreError::io(format!("failed to write {}", path.display()), e))?;
    Ok(path)
}

/// Render the report as a human-readable summary and write it to
/// `report.txt`.
pub fn write_text(report: &Report, output_dir: &Path) -> Result<(PathBuf, String)> {
    let rendered = render_text(report);
    let path = output_dir.join("report.txt");
    std::fs::write(&path, &rendered)
        .map_err(|e| SpectreError::io(format!("failed to write {}", path.display()), e))?;
    Ok((path, rendered))
}

fn render_text(report: &Report) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let meta = &report.metadata;

    let _ = writeln!(out, "=== ClickSpectre Audit Report ===");
    let _ = writeln!(out, "Generated: {}", report.generated_at.to_rfc3339());
    let _ = writeln!(out, "ClickHouse host: {}", meta.clickhouse_host);
    let _ = writeln!(out, "Lookback days: {}", meta.lookback_days);
    let _ = writeln!(out, "Total queries analyzed: {}", meta.total_queries_analyzed);
    out.push('\n');

    let (low, medium, high) = score_distribution(&report.tables);
    let _ = writeln!(out, "=== Summary ===");
    let _ = writeln!(out, "Total tables: {}", report.tables.len());
    let _ = writeln!(out, "Zero-usage tables: {}", count_zero_usage(&report.tables));
    let _ = writeln!(out, "Clients: {}", report.clients.len());
    let _ = writeln!(out, "Score distribution:");
    let _ = writeln!(out, "  0.00-0.29: {low}");
    let _ = writeln!(out, "  0.30-0.69: {medium}");
    let _ = writeln!(out, "  0.70-1.00: {high}");
    out.push('\n');

    let recs = &report.recommendations;
    let _ = writeln!(out, "=== Cleanup Recommendations ===");
    let _ = writeln!(out, "Safe to drop ({}):", recs.safe_to_drop.len());
    for table in &recs.safe_to_drop {
        let _ = writeln!(out, "  - {table}");
    }
    let _ = writeln!(out, "Likely safe ({}):", recs.likely_safe.len());
    for table in &recs.likely_safe {
        let _ = writeln!(out, "  - {table}");
    }
    let zero_usage_total = recs.zero_usage_non_replicated.len() + recs.zero_usage_replicated.len();
    let _ = writeln!(out, "Zero usage ({zero_usage_total}):");
    for rec in recs
        .zero_usage_non_replicated
        .iter()
        .chain(&recs.zero_usage_replicated)
    {
        let replicated = if rec.is_replicated { " [replicated]" } else { "" };
        let _ = writeln!(
            out,
            "  - {} ({:.1} MB, {} rows, {}){}",
            rec.name, rec.size_mb, rec.total_rows, rec.engine, replicated
        );
    }
    let _ = writeln!(out, "Keep: {}", recs.keep.len());
    out.push('\n');

    let _ = writeln!(out, "=== Anomalies ({}) ===", report.anomalies.len());
    if report.anomalies.is_empty() {
        let _ = writeln!(out, "No anomalies detected.");
    }
    for anomaly in &report.anomalies {
        let subject = anomaly
            .affected_table
            .as_deref()
            .or(anomaly.affected_client.as_deref())
            .unwrap_or("-");
        let _ = writeln!(
            out,
            "  [{}] {} {}: {}",
            anomaly.severity.as_str(),
            anomaly.kind.as_str(),
            subject,
            anomaly.description
        );
    }

    out
}

fn score_distribution(tables: &[Table]) -> (usize, usize, usize) {
    let mut low = 0;
    let mut medium = 0;
    let mut high = 0;
    for table in tables {
        if table.score >= 0.70 {
            high += 1;
        } else if table.score >= 0.30 {
            medium += 1;
        } else {
            low += 1;
        }
    }
    (low, medium, high)
}

fn count_zero_usage(tables: &[Table]) -> usize {
    tables.iter().filter(|t| t.zero_usage).count()
}
