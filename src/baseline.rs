//! Baseline fingerprinting and suppression.
//!
//! A baseline is a persisted, sorted set of finding fingerprints. Each
//! fingerprint is the hex SHA-256 of the finding's identity-bearing fields
//! joined by the 0x1F unit separator; volatile fields (sizes, row counts,
//! timestamps) never contribute, so the same logical finding hashes the
//! same across runs. Suppression filters previously acknowledged findings
//! out of a report in place.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::errors::{Result, SpectreError};
use crate::core::models::{Anomaly, Report, TableRecommendation};

/// Baseline path used when updating without an explicit path.
pub const DEFAULT_PATH: &str = ".clickspectre-baseline.json";

const FILE_VERSION: u64 = 1;

const CATEGORY_ZERO_USAGE_NON_REPLICATED: &str = "zero_usage_non_replicated";
const CATEGORY_ZERO_USAGE_REPLICATED: &str = "zero_usage_replicated";
const CATEGORY_SAFE_TO_DROP: &str = "safe_to_drop";
const CATEGORY_LIKELY_SAFE: &str = "likely_safe";

/// Sorted, de-duplicated fingerprint set.
pub type FingerprintSet = BTreeSet<String>;

/// On-disk baseline layout.
#[derive(Debug, Serialize, Deserialize)]
struct BaselineFile {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    fingerprints: Vec<String>,
}

fn hash(parts: &[&str]) -> String {
    let canonical = parts.join("\x1f");
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Stable fingerprint for an anomaly finding.
pub fn fingerprint_anomaly(anomaly: &Anomaly) -> String {
    hash(&[
        "anomaly",
        anomaly.kind.as_str(),
        anomaly.severity.as_str(),
        anomaly.affected_table.as_deref().unwrap_or(""),
        anomaly.affected_client.as_deref().unwrap_or(""),
    ])
}

/// Stable fingerprint for a zero-usage recommendation.
pub fn fingerprint_table_recommendation(category: &str, rec: &TableRecommendation) -> String {
    hash(&["recommendation", category, &rec.name, &rec.database])
}

/// Stable fingerprint for a name-only recommendation.
pub fn fingerprint_table_name(category: &str, table_name: &str) -> String {
    hash(&["recommendation", category, table_name])
}

/// Extract fingerprints for every current finding in the report.
pub fn collect_fingerprints(report: &Report) -> FingerprintSet {
    let mut set = FingerprintSet::new();

    for anomaly in &report.anomalies {
        set.insert(fingerprint_anomaly(anomaly));
    }

    let recs = &report.recommendations;
    for rec in &recs.zero_usage_non_replicated {
        set.insert(fingerprint_table_recommendation(
            CATEGORY_ZERO_USAGE_NON_REPLICATED,
            rec,
        ));
    }
    for rec in &recs.zero_usage_replicated {
        set.insert(fingerprint_table_recommendation(
            CATEGORY_ZERO_USAGE_REPLICATED,
            rec,
        ));
    }
    for table in &recs.safe_to_drop {
        set.insert(fingerprint_table_name(CATEGORY_SAFE_TO_DROP, table));
    }
    for table in &recs.likely_safe {
        set.insert(fingerprint_table_name(CATEGORY_LIKELY_SAFE, table));
    }

    set
}

/// Remove findings whose fingerprints are already known, in place.
///
/// Returns `(suppressed, remaining)` where `remaining` is the finding count
/// after filtering.
pub fn suppress_known(report: &mut Report, known: &FingerprintSet) -> (usize, usize) {
    if known.is_empty() {
        return (0, report.finding_count());
    }

    let mut suppressed = 0usize;

    report.anomalies.retain(|anomaly| {
        let keep = !known.contains(&fingerprint_anomaly(anomaly));
        suppressed += usize::from(!keep);
        keep
    });

    let recs = &mut report.recommendations;
    recs.zero_usage_non_replicated.retain(|rec| {
        let keep = !known.contains(&fingerprint_table_recommendation(
            CATEGORY_ZERO_USAGE_NON_REPLICATED,
            rec,
        ));
        suppressed += usize::from(!keep);
        keep
    });
    recs.zero_usage_replicated.retain(|rec| {
        let keep = !known.contains(&fingerprint_table_recommendation(
            CATEGORY_ZERO_USAGE_REPLICATED,
            rec,
        ));
        suppressed += usize::from(!keep);
        keep
    });
    recs.safe_to_drop.retain(|table| {
        let keep = !known.contains(&fingerprint_table_name(CATEGORY_SAFE_TO_DROP, table));
        suppressed += usize::from(!keep);
        keep
    });
    recs.likely_safe.retain(|table| {
        let keep = !known.contains(&fingerprint_table_name(CATEGORY_LIKELY_SAFE, table));
        suppressed += usize::from(!keep);
        keep
    });

    (suppressed, report.finding_count())
}

/// Union of two fingerprint sets.
pub fn merge(existing: &FingerprintSet, current: &FingerprintSet) -> FingerprintSet {
    existing.union(current).cloned().collect()
}

/// Read a baseline file. A missing file yields an empty set; an unsupported
/// version is fatal.
pub fn load(path: impl AsRef<Path>) -> Result<FingerprintSet> {
    let path = path.as_ref();

    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "baseline file missing, starting empty");
            return Ok(FingerprintSet::new());
        }
        Err(err) => {
            return Err(SpectreError::io(
                format!("failed to read baseline file {}", path.display()),
                err,
            ));
        }
    };

    let file: BaselineFile = serde_json::from_str(&data)
        .map_err(|e| SpectreError::baseline(format!("failed to parse baseline file: {e}")))?;

    if file.version != 0 && file.version != FILE_VERSION {
        return Err(SpectreError::baseline(format!(
            "unsupported baseline version: {}",
            file.version
        )));
    }

    Ok(file
        .fingerprints
        .into_iter()
        .filter(|f| !f.is_empty())
        .collect())
}

/// Write a baseline file with sorted, unique fingerprints.
///
/// The write goes through a temp file in the target directory followed by a
/// rename, so a crash mid-write leaves the previous baseline intact.
pub fn save(path: impl AsRef<Path>, set: &FingerprintSet) -> Result<()> {
    let path = path.as_ref();

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| {
                SpectreError::io(
                    format!("failed to create baseline directory {}", parent.display()),
                    e,
                )
            })?;
            parent
        }
        _ => Path::new("."),
    };

    let payload = BaselineFile {
        version: FILE_VERSION,
        fingerprints: set.iter().cloned().collect(),
    };
    let mut data = serde_json::to_vec_pretty(&payload)?;
    data.push(b'\n');

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        SpectreError::io(
            format!("failed to create temp file in {}", dir.display()),
            e,
        )
    })?;
    temp.write_all(&data).map_err(|e| {
        SpectreError::io("failed to write baseline temp file", e)
    })?;
    temp.persist(path).map_err(|e| {
        SpectreError::io(
            format!("failed to persist baseline file {}", path.display()),
            e.error,
        )
    })?;

    Ok(())
}
