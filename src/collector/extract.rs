//! Table-reference extraction from raw query text.
//!
//! Case-insensitive pattern matching over the clauses `FROM <t>`,
//! `JOIN <t>`, `INSERT INTO <t>`, and `CREATE [OR REPLACE] TABLE
//! [IF NOT EXISTS] <t>`, where `<t>` is `[db.]name`. References are
//! deduplicated within a row, preserving first-appearance order.

use once_cell::sync::Lazy;
use regex::Regex;

const IDENT: &str = r"([a-z_][a-z0-9_]*\.[a-z_][a-z0-9_]*|[a-z_][a-z0-9_]*)";

static TABLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"\bfrom\s+{IDENT}"),
        format!(r"\bjoin\s+{IDENT}"),
        format!(r"\binsert\s+into\s+{IDENT}"),
        format!(r"\bcreate\s+(?:or\s+replace\s+)?table\s+(?:if\s+not\s+exists\s+)?{IDENT}"),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("table pattern is valid"))
    .collect()
});

/// Extract table references from SQL query text.
pub fn extract_tables(query: &str) -> Vec<String> {
    let normalized = query.trim().to_lowercase();

    let mut tables = Vec::new();
    for pattern in TABLE_PATTERNS.iter() {
        for captures in pattern.captures_iter(&normalized) {
            if let Some(name) = captures.get(1) {
                let name = name.as_str().to_string();
                if !tables.contains(&name) {
                    tables.push(name);
                }
            }
        }
    }

    tables
}

/// Extraction wrapper that recovers from any panic; a panicking row yields
/// an empty table list instead of poisoning the batch.
pub fn extract_tables_safe(query: &str) -> Vec<String> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| extract_tables(query)))
        .unwrap_or_default()
}
