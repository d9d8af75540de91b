//! SARIF 2.1.0 emitter.
//!
//! Maps findings onto three rules (zero-usage, low-usage, anomaly) with
//! one result per finding. `partialFingerprints` reuse the baseline
//! fingerprint helpers, so SARIF consumers see the same stable identity the
//! baseline engine uses for suppression.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::baseline;
use crate::core::errors::{Result, SpectreError};
use crate::core::models::{Report, Severity};

const SCHEMA_URI: &str =
    "https://docs.oasis-open.org/sarif/sarif/v2.1.0/cs01/schemas/sarif-schema-2.1.0.json";
const RULE_ZERO_USAGE: &str = "clickspectre/ZERO_USAGE";
const RULE_LOW_USAGE: &str = "clickspectre/LOW_USAGE";
const RULE_ANOMALY: &str = "clickspectre/ANOMALY";
const FINGERPRINT_KEY: &str = "clickspectreFinding/v1";
const FALLBACK_ARTIFACT_URI: &str = "README.md";

#[derive(Debug, Serialize)]
struct SarifLog {
    version: &'static str,
    #[serde(rename = "$schema")]
    schema: &'static str,
    runs: Vec<SarifRun>,
}

#[derive(Debug, Serialize)]
struct SarifRun {
    tool: SarifTool,
    results: Vec<SarifResult>,
}

#[derive(Debug, Serialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifDriver {
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    version: String,
    information_uri: &'static str,
    short_description: SarifMessage,
    rules: Vec<SarifRule>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifRule {
    id: &'static str,
    name: &'static str,
    short_description: SarifMessage,
    default_configuration: SarifConfiguration,
}

#[derive(Debug, Serialize)]
struct SarifConfiguration {
    level: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifResult {
    rule_id: &'static str,
    rule_index: usize,
    level: &'static str,
    message: SarifMessage,
    locations: Vec<SarifLocation>,
    partial_fingerprints: std::collections::BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
struct SarifMessage {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifLocation {
    physical_location: SarifPhysicalLocation,
    logical_locations: Vec<SarifLogicalLocation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifPhysicalLocation {
    artifact_location: SarifArtifactLocation,
}

#[derive(Debug, Serialize)]
struct SarifArtifactLocation {
    uri: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifLogicalLocation {
    fully_qualified_name: String,
    kind: &'static str,
}

fn severity_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "note",
        Severity::Medium => "warning",
        Severity::High => "error",
    }
}

fn location_for(name: &str, kind: &'static str) -> SarifLocation {
    SarifLocation {
        physical_location: SarifPhysicalLocation {
            artifact_location: SarifArtifactLocation {
                uri: FALLBACK_ARTIFACT_URI,
            },
        },
        logical_locations: vec![SarifLogicalLocation {
            fully_qualified_name: name.to_string(),
            kind,
        }],
    }
}

fn result_for(
    rule_id: &'static str,
    rule_index: usize,
    level: &'static str,
    message: String,
    location: SarifLocation,
    fingerprint: String,
) -> SarifResult {
    let mut partial_fingerprints = std::collections::BTreeMap::new();
    partial_fingerprints.insert(FINGERPRINT_KEY, fingerprint);

    SarifResult {
        rule_id,
        rule_index,
        level,
        message: SarifMessage { text: message },
        locations: vec![location],
        partial_fingerprints,
    }
}

fn build_sarif(report: &Report) -> SarifLog {
    let rules = vec![
        SarifRule {
            id: RULE_ZERO_USAGE,
            name: "ZeroUsageTable",
            short_description: SarifMessage {
                text: "Table exists in the catalog but had no queries in the lookback window"
                    .to_string(),
            },
            default_configuration: SarifConfiguration { level: "warning" },
        },
        SarifRule {
            id: RULE_LOW_USAGE,
            name: "LowUsageTable",
            short_description: SarifMessage {
                text: "Table usage is low enough to recommend cleanup review".to_string(),
            },
            default_configuration: SarifConfiguration { level: "warning" },
        },
        SarifRule {
            id: RULE_ANOMALY,
            name: "AccessAnomaly",
            short_description: SarifMessage {
                text: "Unusual access pattern detected".to_string(),
            },
            default_configuration: SarifConfiguration { level: "note" },
        },
    ];

    let mut results = Vec::new();
    let recs = &report.recommendations;

    for (category, bucket) in [
        ("zero_usage_non_replicated", &recs.zero_usage_non_replicated),
        ("zero_usage_replicated", &recs.zero_usage_replicated),
    ] {
        for rec in bucket {
            results.push(result_for(
                RULE_ZERO_USAGE,
                0,
                "warning",
                format!(
                    "Table {} ({:.1} MB, engine {}) had no queries in the lookback window",
                    rec.name, rec.size_mb, rec.engine
                ),
                location_for(&rec.name, "table"),
                baseline::fingerprint_table_recommendation(category, rec),
            ));
        }
    }

    for table in &recs.safe_to_drop {
        results.push(result_for(
            RULE_LOW_USAGE,
            1,
            "warning",
            format!("Table {table} appears unused and is safe to drop"),
            location_for(table, "table"),
            baseline::fingerprint_table_name("safe_to_drop", table),
        ));
    }
    for table in &recs.likely_safe {
        results.push(result_for(
            RULE_LOW_USAGE,
            1,
            "note",
            format!("Table {table} has low usage; review before cleanup"),
            location_for(table, "table"),
            baseline::fingerprint_table_name("likely_safe", table),
        ));
    }

    for anomaly in &report.anomalies {
        let subject = anomaly
            .affected_table
            .as_deref()
            .or(anomaly.affected_client.as_deref())
            .unwrap_or("unknown");
        let kind = if anomaly.affected_table.is_some() {
            "table"
        } else {
            "client"
        };
        results.push(result_for(
            RULE_ANOMALY,
            2,
            severity_level(anomaly.severity),
            format!("{}: {} ({})", anomaly.kind.as_str(), anomaly.description, subject),
            location_for(subject, kind),
            baseline::fingerprint_anomaly(anomaly),
        ));
    }

    SarifLog {
        version: "2.1.0",
        schema: SCHEMA_URI,
        runs: vec![SarifRun {
            tool: SarifTool {
                driver: SarifDriver {
                    name: report.tool.clone(),
                    version: report.version.clone(),
                    information_uri: "https://github.com/ppiankov/clickspectre-rs",
                    short_description: SarifMessage {
                        text: "ClickHouse usage analyzer".to_string(),
                    },
                    rules,
                },
            },
            results,
        }],
    }
}

/// Write a SARIF 2.1.0 document to `report.sarif`.
pub fn write_sarif(report: &Report, output_dir: &Path) -> Result<PathBuf> {
    let log = build_sarif(report);
    let data = serde_json::to_vec_pretty(&log)?;
    let path = output_dir.join("report.sarif");
    std::fs::write(&path, data)
        .map_err(|e| SpectreError::io(format!("failed to write {}", path.display()), e))?;
    Ok(path)
}
