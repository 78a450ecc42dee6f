use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use visitstats_scheduler::cli::Command;
use visitstats_scheduler::scheduler;
use visitstats_scheduler::state::AppState;

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("visitstats=info".parse()?),
        )
        .json()
        .init();

    let cfg = visitstats_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Ensure data directory exists before opening DuckDB.
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db = visitstats_duckdb::DuckDbBackend::open(&cfg.db_path(), &cfg.duckdb_memory_limit)?;
    db.ping().await.context("DuckDB liveness check failed")?;
    let state = Arc::new(AppState::new(db, cfg));

    match command {
        Command::Run => {
            let loop_state = Arc::clone(&state);
            let scheduler = tokio::spawn(async move {
                scheduler::run_scheduler_loop(loop_state).await;
            });
            tokio::signal::ctrl_c().await?;
            info!("Shutdown requested");
            scheduler.abort();
        }
        Command::RunOnce => {
            let summary = scheduler::process_once(&state, Utc::now()).await?;
            print_json(&summary)?;
        }
        Command::Backfill { start, end, resume } => {
            let report = if resume {
                state.engine.resume_backfill(start, end).await?
            } else {
                state.engine.force_aggregation(start, end).await?
            };
            print_json(&report)?;
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Command::Summary { start, end } => {
            let summary = state.engine.get_dashboard_summary(start, end).await?;
            print_json(&summary)?;
        }
    }

    Ok(())
}
