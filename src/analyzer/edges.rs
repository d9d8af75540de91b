//! Client→table edge fold.

use std::collections::HashMap;

use crate::analyzer::{is_read_kind, is_write_kind, Analyzer};
use crate::core::models::{Edge, LogRow};

impl Analyzer {
    /// Fold log rows into client→table aggregates. Runs after the client
    /// fold so the display name can use a resolved workload identity.
    pub(super) fn fold_edges(&mut self, rows: &[LogRow]) {
        let mut edge_map: HashMap<(String, String), Edge> = HashMap::new();

        for row in rows {
            let address = row.client_address.as_str();
            if address.is_empty() {
                continue;
            }

            let display_name = self
                .clients
                .get(address)
                .map(|client| client.display_name().to_string())
                .unwrap_or_else(|| address.to_string());

            for table_name in &row.tables {
                if table_name.is_empty() || self.filter.is_table_excluded(table_name) {
                    continue;
                }

                let key = (address.to_string(), table_name.clone());
                let edge = edge_map.entry(key).or_insert_with(|| Edge {
                    client_address: address.to_string(),
                    display_name: display_name.clone(),
                    table: table_name.clone(),
                    reads: 0,
                    writes: 0,
                    last_activity: Some(row.event_time),
                });

                if is_read_kind(&row.query_kind) {
                    edge.reads += row.read_rows;
                } else if is_write_kind(&row.query_kind) {
                    edge.writes += row.written_rows;
                }

                edge.last_activity = Some(match edge.last_activity {
                    Some(last) => last.max(row.event_time),
                    None => row.event_time,
                });
            }
        }

        self.edges = edge_map.into_values().collect();
    }
}
