//! Glob-based exclusion filter over table and database identifiers.
//!
//! Shared by the collector and the analyzer. Patterns and values are
//! compared case-insensitively; a pattern that fails to compile as a glob
//! degrades to an exact-match comparison instead of erroring.

use globset::{Glob, GlobMatcher};

#[derive(Debug, Clone)]
enum Pattern {
    Glob(GlobMatcher),
    Exact(String),
}

impl Pattern {
    fn compile(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }

        match Glob::new(&normalized) {
            Ok(glob) => Some(Self::Glob(glob.compile_matcher())),
            Err(_) => Some(Self::Exact(normalized)),
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Glob(matcher) => matcher.is_match(value),
            Self::Exact(exact) => exact == value,
        }
    }
}

/// Immutable predicate over `database.table` and `database` identifiers.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    tables: Vec<Pattern>,
    databases: Vec<Pattern>,
}

impl ExclusionFilter {
    /// Compile table and database patterns into a filter.
    pub fn new(table_patterns: &[String], database_patterns: &[String]) -> Self {
        Self {
            tables: table_patterns.iter().filter_map(|p| Pattern::compile(p)).collect(),
            databases: database_patterns
                .iter()
                .filter_map(|p| Pattern::compile(p))
                .collect(),
        }
    }

    /// Whether a database matches any database exclusion pattern.
    pub fn is_database_excluded(&self, database: &str) -> bool {
        let value = database.trim().to_lowercase();
        if value.is_empty() {
            return false;
        }
        self.databases.iter().any(|p| p.matches(&value))
    }

    /// Whether a `database.table` identifier matches any exclusion pattern.
    ///
    /// The database part is checked against the database patterns; the full
    /// identifier and the bare table name are each checked against the table
    /// patterns.
    pub fn is_table_excluded(&self, full_name: &str) -> bool {
        let value = full_name.trim().to_lowercase();
        if value.is_empty() {
            return false;
        }

        let (database, table) = match value.split_once('.') {
            Some((db, table)) => (db, table),
            None => ("", value.as_str()),
        };

        if !database.is_empty() && self.is_database_excluded(database) {
            return true;
        }

        self.tables
            .iter()
            .any(|p| p.matches(&value) || (!table.is_empty() && p.matches(table)))
    }

    /// Whether the filter has no patterns at all.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.databases.is_empty()
    }
}
