//! Rule-based anomaly detection over tables and clients.

use chrono::{DateTime, Utc};

use crate::analyzer::Analyzer;
use crate::core::models::{Anomaly, AnomalyKind, Severity};

/// A client using more tables than this is flagged for broad access.
const BROAD_ACCESS_TABLE_LIMIT: usize = 20;

impl Analyzer {
    /// Emit rule-based findings over the finished table and client models.
    ///
    /// Tables and clients are visited in identifier order so the emitted
    /// report is stable across runs with the same inputs.
    pub(super) fn detect_anomalies(&mut self, now: DateTime<Utc>) {
        let mut table_names: Vec<&String> = self.tables.keys().collect();
        table_names.sort();

        let mut anomalies = Vec::new();

        for table_name in table_names {
            let table = &self.tables[table_name];
            let total_access = table.reads + table.writes;
            let days_since_access = table.days_since_access(now);

            if total_access == 1 {
                anomalies.push(table_anomaly(
                    AnomalyKind::SingleAccess,
                    Severity::Low,
                    "Table accessed only once in lookback period",
                    table_name,
                    now,
                ));
                // Single access short-circuits the remaining table rules.
                continue;
            }

            if days_since_access > 30.0 {
                anomalies.push(table_anomaly(
                    AnomalyKind::StaleTable,
                    Severity::Medium,
                    "Table not accessed in over 30 days",
                    table_name,
                    now,
                ));
            }

            if table.writes > 0 && table.reads == 0 {
                anomalies.push(table_anomaly(
                    AnomalyKind::WriteOnly,
                    Severity::Low,
                    "Table has writes but no reads (possible data sink)",
                    table_name,
                    now,
                ));
            }

            if table.reads > 100 && table.writes == 0 {
                anomalies.push(table_anomaly(
                    AnomalyKind::ReadOnly,
                    Severity::Low,
                    "Table has many reads but no writes (check if data is stale)",
                    table_name,
                    now,
                ));
            }

            if total_access < 10 && days_since_access > 7.0 {
                anomalies.push(table_anomaly(
                    AnomalyKind::LowActivity,
                    Severity::Medium,
                    "Table has very low activity (< 10 accesses)",
                    table_name,
                    now,
                ));
            }
        }

        let mut addresses: Vec<&String> = self.clients.keys().collect();
        addresses.sort();

        for address in addresses {
            let client = &self.clients[address];
            if client.tables_used.len() > BROAD_ACCESS_TABLE_LIMIT {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::BroadAccess,
                    severity: Severity::Low,
                    description: "Client accesses many tables (> 20), check for over-privileged access"
                        .to_string(),
                    affected_table: None,
                    affected_client: Some(address.clone()),
                    detected_at: now,
                });
            }
        }

        self.anomalies = anomalies;
    }
}

fn table_anomaly(
    kind: AnomalyKind,
    severity: Severity,
    description: &str,
    table_name: &str,
    now: DateTime<Utc>,
) -> Anomaly {
    Anomaly {
        kind,
        severity,
        description: description.to_string(),
        affected_table: Some(table_name.to_string()),
        affected_client: None,
        detected_at: now,
    }
}
