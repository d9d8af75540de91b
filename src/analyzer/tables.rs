//! Table model fold and activity-series generation.

use std::collections::HashMap;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::analyzer::{is_read_kind, is_write_kind, Analyzer};
use crate::core::models::{LogRow, Table, TimeSeriesPoint};

impl Analyzer {
    /// Fold log rows into per-table read/write counters and first/last
    /// timestamps.
    pub(super) fn fold_tables(&mut self, rows: &[LogRow]) {
        for row in rows {
            for table_name in &row.tables {
                if table_name.is_empty() || self.filter.is_table_excluded(table_name) {
                    continue;
                }

                let table = self
                    .tables
                    .entry(table_name.clone())
                    .or_insert_with(|| Table::new(table_name.clone()));

                if is_read_kind(&row.query_kind) {
                    table.reads += row.read_rows;
                } else if is_write_kind(&row.query_kind) {
                    table.writes += row.written_rows;
                }

                table.last_access = Some(match table.last_access {
                    Some(last) => last.max(row.event_time),
                    None => row.event_time,
                });
                table.first_seen = Some(match table.first_seen {
                    Some(first) => first.min(row.event_time),
                    None => row.event_time,
                });
            }
        }
    }

    /// Produce per-table hour-bucketed query-count series, sorted ascending
    /// by timestamp.
    pub(super) fn build_activity_series(&mut self, rows: &[LogRow]) {
        let mut buckets: HashMap<(String, DateTime<Utc>), u64> = HashMap::new();

        for row in rows {
            let hour = row
                .event_time
                .duration_trunc(TimeDelta::hours(1))
                .unwrap_or(row.event_time);

            for table_name in &row.tables {
                if table_name.is_empty() || self.filter.is_table_excluded(table_name) {
                    continue;
                }
                *buckets.entry((table_name.clone(), hour)).or_insert(0) += 1;
            }
        }

        let mut series: HashMap<String, Vec<TimeSeriesPoint>> = HashMap::new();
        for ((table_name, timestamp), value) in buckets {
            series
                .entry(table_name)
                .or_default()
                .push(TimeSeriesPoint { timestamp, value });
        }

        for (table_name, table) in &mut self.tables {
            let mut points = series.remove(table_name).unwrap_or_default();
            points.sort_by_key(|p| p.timestamp);
            table.activity_series = points;
        }
    }
}
