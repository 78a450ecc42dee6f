use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::state::AppState;

pub mod retention;
pub mod rollups;

/// What one scheduler iteration did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickSummary {
    pub days_aggregated: usize,
    pub periods_rolled_up: usize,
    pub retention_ran: bool,
}

/// One scheduler iteration at `now`.
///
/// Nothing happens before the configured daily run hour. After it, every
/// pending day through yesterday is aggregated (a bounded batch per tick),
/// closed periods are rolled up, and retention runs once per day. Work
/// already recorded in the run ledger is not repeated.
pub async fn process_once(state: &Arc<AppState>, now: DateTime<Utc>) -> anyhow::Result<TickSummary> {
    let mut summary = TickSummary::default();
    if now.hour() < state.config.daily_run_hour {
        return Ok(summary);
    }
    let today = now.date_naive();

    let committed = rollups::catch_up_days(state, today).await?;
    summary.days_aggregated = committed.len();
    summary.periods_rolled_up = rollups::roll_up_closed_periods(state, today, &committed).await?;
    summary.retention_ran = retention::run_daily_retention(state, today).await;
    Ok(summary)
}

pub async fn run_scheduler_loop(state: Arc<AppState>) {
    let tick = state.config.scheduler_tick();
    info!(tick_seconds = tick.as_secs(), "Aggregation scheduler started");
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match process_once(&state, Utc::now()).await {
            Ok(summary) if summary != TickSummary::default() => {
                info!(
                    days = summary.days_aggregated,
                    periods = summary.periods_rolled_up,
                    retention = summary.retention_ran,
                    "Scheduler iteration finished"
                );
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "aggregation scheduler iteration failed"),
        }
    }
}
