//! Table scoring and cleanup recommendations.
//!
//! Each table gets a deterministic score in [0, 1] from a weighted sum of
//! recency, volume, client diversity, and write liveness, then flows
//! through the recommendation pipeline: the zero-usage branch, the safety
//! gates, the minimum-query floor, and finally the category-to-bucket
//! mapping.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::config::Config;
use crate::core::models::{Category, Client, Recommendations, Table, TableRecommendation};

/// Score at or above which a table is considered active.
const ACTIVE_THRESHOLD: f64 = 0.70;
/// Score at or above which a table is merely suspect.
const SUSPECT_THRESHOLD: f64 = 0.30;

/// Table scoring algorithm.
pub trait Scorer: Send + Sync {
    /// Score a table in [0, 1]; higher means more alive.
    fn score(&self, table: &Table, clients: &HashMap<String, Client>, now: DateTime<Utc>) -> f64;

    /// Map a score to a category.
    fn categorize(&self, score: f64) -> Category {
        if score >= ACTIVE_THRESHOLD {
            Category::Active
        } else if score >= SUSPECT_THRESHOLD {
            Category::Suspect
        } else {
            Category::Unused
        }
    }
}

/// Create a scorer by algorithm name. Unknown names fall back to the
/// simple scorer.
pub fn scorer_for(algorithm: &str) -> Box<dyn Scorer> {
    match algorithm {
        "simple" => Box::new(SimpleScorer),
        _ => Box::new(SimpleScorer),
    }
}

/// Weighted-sum scorer over recency, volume, diversity, and write liveness.
#[derive(Debug, Default)]
pub struct SimpleScorer;

impl Scorer for SimpleScorer {
    fn score(&self, table: &Table, clients: &HashMap<String, Client>, now: DateTime<Utc>) -> f64 {
        let mut score = 0.0;

        // Recency (40% weight)
        let days_since_access = table.days_since_access(now);
        if days_since_access < 7.0 {
            score += 0.40;
        } else if days_since_access < 30.0 {
            score += 0.30;
        } else if days_since_access < 90.0 {
            score += 0.10;
        }

        // Volume (30% weight)
        let total = table.reads + table.writes;
        if total > 1000 {
            score += 0.30;
        } else if total > 100 {
            score += 0.20;
        } else if total > 10 {
            score += 0.10;
        }

        // Client diversity (20% weight)
        let unique_clients = clients_using_table(&table.full_name, clients);
        if unique_clients > 5 {
            score += 0.20;
        } else if unique_clients > 2 {
            score += 0.15;
        } else if unique_clients > 0 {
            score += 0.05;
        }

        // Write liveness (10% weight): active writes mean the table is
        // still being maintained.
        if table.writes > 0 {
            score += 0.10;
        }

        score
    }
}

fn clients_using_table(full_name: &str, clients: &HashMap<String, Client>) -> usize {
    clients
        .values()
        .filter(|client| client.tables_used.iter().any(|t| t == full_name))
        .count()
}

/// Whether an identifier belongs to a system catalog and must never be
/// recommended for cleanup.
pub fn is_system_table(full_name: &str) -> bool {
    let lower = full_name.to_lowercase();
    lower.starts_with("system.") || lower.starts_with("information_schema.")
}

fn is_safe_to_recommend(table: &Table, now: DateTime<Utc>) -> bool {
    if is_system_table(&table.full_name) {
        return false;
    }

    // Recent writes veto cleanup. Last access is the write-recency
    // surrogate: the fold does not track a separate last-write time.
    if table.writes > 0 && table.days_since_access(now) < 7.0 {
        return false;
    }

    // Materialized views need special handling and are never recommended.
    if table.is_materialized_view {
        return false;
    }

    true
}

/// Score every table and assign it to a recommendation bucket.
///
/// Tables are visited in identifier order and the zero-usage buckets are
/// sorted by size descending, so the output is stable for identical inputs.
/// Scores and categories are written back onto the scored tables.
pub fn generate_recommendations(
    tables: &mut HashMap<String, Table>,
    clients: &HashMap<String, Client>,
    config: &Config,
    now: DateTime<Utc>,
) -> Recommendations {
    let scorer = scorer_for(&config.scoring_algorithm);
    let mut recommendations = Recommendations::default();

    let mut names: Vec<String> = tables.keys().cloned().collect();
    names.sort();

    for name in names {
        let Some(table) = tables.get_mut(&name) else {
            continue;
        };

        // Zero-usage branch: catalog-only tables large enough to matter.
        if table.zero_usage {
            if table.size_mb() < config.min_table_size_mb {
                continue;
            }

            let score = scorer.score(table, clients, now);
            table.score = score;

            if score < SUSPECT_THRESHOLD
                && !table.is_materialized_view
                && table.dependencies.is_empty()
                && !is_system_table(&table.full_name)
            {
                let rec = TableRecommendation {
                    name: table.full_name.clone(),
                    database: table.database.clone(),
                    engine: table.engine.clone(),
                    is_replicated: table.is_replicated,
                    size_mb: table.size_mb(),
                    total_rows: table.total_rows,
                };
                if table.is_replicated {
                    recommendations.zero_usage_replicated.push(rec);
                } else {
                    recommendations.zero_usage_non_replicated.push(rec);
                }
            }
            continue;
        }

        // Safety gates protect system tables, recently-written tables, and
        // materialized views.
        if !is_safe_to_recommend(table, now) {
            recommendations.keep.push(name);
            continue;
        }

        let score = scorer.score(table, clients, now);
        let category = scorer.categorize(score);
        table.score = score;
        table.category = Some(category);

        // Minimum-query floor demotes quiet tables to review.
        if config.min_query_count > 0 && table.query_count() < config.min_query_count {
            recommendations.likely_safe.push(name);
            continue;
        }

        match category {
            Category::Active => recommendations.keep.push(name),
            Category::Suspect => recommendations.likely_safe.push(name),
            Category::Unused => recommendations.safe_to_drop.push(name),
        }
    }

    sort_by_size_desc(&mut recommendations.zero_usage_non_replicated);
    sort_by_size_desc(&mut recommendations.zero_usage_replicated);

    debug!(
        safe_to_drop = recommendations.safe_to_drop.len(),
        likely_safe = recommendations.likely_safe.len(),
        keep = recommendations.keep.len(),
        zero_usage = recommendations.zero_usage_non_replicated.len()
            + recommendations.zero_usage_replicated.len(),
        "generated recommendations"
    );

    recommendations
}

fn sort_by_size_desc(recs: &mut [TableRecommendation]) {
    recs.sort_by(|a, b| {
        b.size_mb
            .partial_cmp(&a.size_mb)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn table_accessed(full_name: &str, days_ago: i64, reads: u64, writes: u64) -> Table {
        let mut table = Table::new(full_name);
        table.reads = reads;
        table.writes = writes;
        table.last_access = Some(now() - chrono::Duration::days(days_ago));
        table.first_seen = table.last_access;
        table
    }

    fn clients_for(full_name: &str, count: usize) -> HashMap<String, Client> {
        let mut clients = HashMap::new();
        for i in 0..count {
            let mut client = Client::new(format!("10.0.0.{i}"));
            client.tables_used.push(full_name.to_string());
            clients.insert(client.address.clone(), client);
        }
        clients
    }

    fn config() -> Config {
        Config {
            dsn: "http://localhost:8123".into(),
            ..Config::default()
        }
    }

    #[test]
    fn active_table_scores_high() {
        // Recent access, high volume, six clients, no writes: 0.90.
        let table = table_accessed("db.events", 2, 2000, 0);
        let clients = clients_for("db.events", 6);

        let score = SimpleScorer.score(&table, &clients, now());
        assert!((score - 0.90).abs() < 1e-9, "got {score}");
        assert_eq!(SimpleScorer.categorize(score), Category::Active);
    }

    #[test]
    fn stale_empty_table_scores_zero() {
        let table = table_accessed("db.old", 120, 0, 0);
        let score = SimpleScorer.score(&table, &HashMap::new(), now());
        assert_eq!(score, 0.0);
        assert_eq!(SimpleScorer.categorize(score), Category::Unused);
    }

    #[test]
    fn recency_is_monotonic() {
        let clients = HashMap::new();
        let recent = SimpleScorer.score(&table_accessed("db.t", 2, 50, 0), &clients, now());
        let older = SimpleScorer.score(&table_accessed("db.t", 20, 50, 0), &clients, now());
        let ancient = SimpleScorer.score(&table_accessed("db.t", 200, 50, 0), &clients, now());
        assert!(recent >= older && older >= ancient);
    }

    #[test]
    fn write_liveness_adds_a_tenth() {
        let clients = HashMap::new();
        let with_writes = SimpleScorer.score(&table_accessed("db.t", 2, 0, 50), &clients, now());
        let without = SimpleScorer.score(&table_accessed("db.t", 2, 50, 0), &clients, now());
        assert!((with_writes - without - 0.10).abs() < 1e-9);
    }

    #[test]
    fn active_table_lands_in_keep() {
        let mut tables = HashMap::new();
        tables.insert("db.events".to_string(), table_accessed("db.events", 2, 2000, 0));
        let clients = clients_for("db.events", 6);

        let recs = generate_recommendations(&mut tables, &clients, &config(), now());
        assert_eq!(recs.keep, vec!["db.events".to_string()]);
        assert!(recs.safe_to_drop.is_empty());

        let table = &tables["db.events"];
        assert!((table.score - 0.90).abs() < 1e-9);
        assert_eq!(table.category, Some(Category::Active));
    }

    #[test]
    fn unused_table_lands_in_safe_to_drop() {
        let mut tables = HashMap::new();
        tables.insert("db.old".to_string(), table_accessed("db.old", 120, 0, 0));

        let recs = generate_recommendations(&mut tables, &HashMap::new(), &config(), now());
        assert_eq!(recs.safe_to_drop, vec!["db.old".to_string()]);
    }

    #[test]
    fn system_tables_are_gated_to_keep() {
        let mut tables = HashMap::new();
        tables.insert(
            "system.query_log".to_string(),
            table_accessed("system.query_log", 120, 0, 0),
        );
        tables.insert(
            "INFORMATION_SCHEMA.tables".to_string(),
            table_accessed("INFORMATION_SCHEMA.tables", 120, 0, 0),
        );

        let recs = generate_recommendations(&mut tables, &HashMap::new(), &config(), now());
        assert!(recs.safe_to_drop.is_empty());
        assert!(recs.likely_safe.is_empty());
        assert_eq!(recs.keep.len(), 2);
    }

    #[test]
    fn recent_writes_gate_to_keep() {
        let mut tables = HashMap::new();
        tables.insert("db.hot".to_string(), table_accessed("db.hot", 2, 0, 5));

        let recs = generate_recommendations(&mut tables, &HashMap::new(), &config(), now());
        assert_eq!(recs.keep, vec!["db.hot".to_string()]);
    }

    #[test]
    fn materialized_views_are_gated_to_keep() {
        let mut tables = HashMap::new();
        let mut mv = table_accessed("db.mv", 120, 0, 0);
        mv.is_materialized_view = true;
        tables.insert("db.mv".to_string(), mv);

        let recs = generate_recommendations(&mut tables, &HashMap::new(), &config(), now());
        assert_eq!(recs.keep, vec!["db.mv".to_string()]);
    }

    #[test]
    fn min_query_floor_demotes_to_likely_safe() {
        let mut tables = HashMap::new();
        // 200-day-old table with a little volume: would be safe_to_drop.
        tables.insert("db.quiet".to_string(), table_accessed("db.quiet", 200, 20, 0));

        let mut cfg = config();
        cfg.min_query_count = 100;
        let recs = generate_recommendations(&mut tables, &HashMap::new(), &cfg, now());
        assert_eq!(recs.likely_safe, vec!["db.quiet".to_string()]);
        assert!(recs.safe_to_drop.is_empty());
    }

    #[test]
    fn zero_usage_branch_collects_and_sorts_by_size() {
        let mut tables = HashMap::new();

        let mut big = Table::new("db.archive");
        big.zero_usage = true;
        big.engine = "MergeTree".to_string();
        big.total_bytes = 2000 * 1024 * 1024;
        tables.insert(big.full_name.clone(), big);

        let mut small = Table::new("db.backup");
        small.zero_usage = true;
        small.engine = "MergeTree".to_string();
        small.total_bytes = 500 * 1024 * 1024;
        tables.insert(small.full_name.clone(), small);

        let mut replicated = Table::new("db.mirror");
        replicated.zero_usage = true;
        replicated.engine = "ReplicatedMergeTree".to_string();
        replicated.is_replicated = true;
        replicated.total_bytes = 100 * 1024 * 1024;
        tables.insert(replicated.full_name.clone(), replicated);

        let recs = generate_recommendations(&mut tables, &HashMap::new(), &config(), now());

        let names: Vec<&str> = recs
            .zero_usage_non_replicated
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["db.archive", "db.backup"]);
        assert!(recs.zero_usage_non_replicated[0].size_mb > recs.zero_usage_non_replicated[1].size_mb);

        assert_eq!(recs.zero_usage_replicated.len(), 1);
        assert_eq!(recs.zero_usage_replicated[0].name, "db.mirror");
        assert!(recs.zero_usage_replicated[0].is_replicated);
    }

    #[test]
    fn zero_usage_below_size_threshold_is_silently_skipped() {
        let mut tables = HashMap::new();
        let mut tiny = Table::new("db.tiny");
        tiny.zero_usage = true;
        tiny.total_bytes = 100 * 1024; // 0.1 MB, threshold is 1 MB
        tables.insert(tiny.full_name.clone(), tiny);

        let recs = generate_recommendations(&mut tables, &HashMap::new(), &config(), now());
        assert_eq!(recs.finding_count(), 0);
        assert!(recs.keep.is_empty());
    }

    #[test]
    fn zero_usage_system_table_is_never_recommended() {
        let mut tables = HashMap::new();
        let mut sys = Table::new("system.trace_log");
        sys.zero_usage = true;
        sys.total_bytes = 100 * 1024 * 1024;
        tables.insert(sys.full_name.clone(), sys);

        let recs = generate_recommendations(&mut tables, &HashMap::new(), &config(), now());
        assert_eq!(recs.finding_count(), 0);
    }

    #[test]
    fn zero_usage_with_dependencies_is_not_recommended() {
        let mut tables = HashMap::new();
        let mut fed = Table::new("db.fed");
        fed.zero_usage = true;
        fed.total_bytes = 100 * 1024 * 1024;
        fed.dependencies = vec!["db.mv".to_string()];
        tables.insert(fed.full_name.clone(), fed);

        let recs = generate_recommendations(&mut tables, &HashMap::new(), &config(), now());
        assert_eq!(recs.finding_count(), 0);
    }

    #[test]
    fn buckets_are_stable_across_runs() {
        let build = || {
            let mut tables = HashMap::new();
            for name in ["db.c", "db.a", "db.b"] {
                tables.insert(name.to_string(), table_accessed(name, 120, 0, 0));
            }
            generate_recommendations(&mut tables, &HashMap::new(), &config(), now())
        };

        let first = build();
        let second = build();
        assert_eq!(first.safe_to_drop, second.safe_to_drop);
        assert_eq!(first.safe_to_drop, vec!["db.a", "db.b", "db.c"]);
    }
}
