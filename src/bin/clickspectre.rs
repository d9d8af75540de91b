//! ClickSpectre CLI - ClickHouse usage analyzer.
//!
//! Reads the server's query log, scores table usage, and emits a cleanup
//! report. The process exit code is the run's exit signal: 0 success,
//! 6 findings detected, and error-family codes otherwise.

use clap::Parser;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let signal = match cli.command {
        Commands::Analyze(args) => cli::analyze_command(*args).await,
        Commands::Version => cli::version_command(),
    };

    std::process::exit(signal.code());
}
