//! # ClickSpectre: ClickHouse Usage Analyzer
//!
//! A point-in-time analyzer for ClickHouse deployments. ClickSpectre reads the
//! server's query-execution log and table catalog, reconstructs which client
//! workloads queried which tables over a lookback window, scores each table's
//! cleanup safety, detects access anomalies, and emits a structured finding
//! report. Nothing is ever written to the database; all effects are confined
//! to local report files and an optional baseline file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         CLI Layer                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Collector   │  Analyzer   │  Scorer &    │  I/O & Reports  │
//! │              │             │  Detectors   │                 │
//! │ • query log  │ • tables    │ • scoring    │ • JSON          │
//! │ • catalog    │ • clients   │ • anomalies  │ • text          │
//! │ • retry      │ • edges     │ • baseline   │ • SARIF         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use clickspectre::collector::clickhouse::ClickHouseStore;
//! use clickspectre::core::config::Config;
//! use clickspectre::core::context::RunContext;
//! use clickspectre::core::pipeline::run_analysis;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.dsn = "http://localhost:8123".to_string();
//!
//!     let config = Arc::new(config);
//!     let store = Arc::new(ClickHouseStore::connect(&config).await?);
//!     let ctx = RunContext::new();
//!
//!     let outcome = run_analysis(config, store, None, &ctx).await?;
//!     println!("{} tables analyzed", outcome.report.tables.len());
//!     Ok(())
//! }
//! ```

#![warn(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::struct_excessive_bools)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

// Core configuration, models, and pipeline
pub mod core {
    //! Core configuration, entity models, scoring, and orchestration.

    pub mod config;
    pub mod context;
    pub mod errors;
    pub mod exclude;
    pub mod models;
    pub mod pipeline;
    pub mod scoring;
}

// Query-log and catalog extraction
pub mod collector;

// Workload identity resolution
pub mod resolver;

// Log-row folding and anomaly detection
pub mod analyzer;

// Baseline fingerprinting and suppression
pub mod baseline;

// Report emitters
pub mod io {
    //! Report serialization and emission.

    pub mod reports;
    pub mod sarif;
}

// Re-export primary types for convenience
pub use crate::core::config::Config;
pub use crate::core::errors::{ExitSignal, Result, SpectreError};
pub use crate::core::models::Report;
pub use crate::core::pipeline::{run_analysis, AnalysisOutcome};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tool name used in report metadata and SARIF output.
pub const TOOL_NAME: &str = "clickspectre";
