use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::state::AppState;

/// Run retention at most once per calendar day. Returns `true` when it ran.
///
/// Step failures are logged; the day is still claimed so a broken store is
/// not hammered every tick.
pub async fn run_daily_retention(state: &Arc<AppState>, today: NaiveDate) -> bool {
    if !state.claim_retention_run(today).await {
        return false;
    }
    let report = state
        .engine
        .run_retention(today, state.config.retention_policy())
        .await;
    if report.is_clean() {
        info!(
            today = %today,
            raw_deleted = report.raw.as_ref().map(|r| r.deleted).unwrap_or(0),
            aggregates_deleted = report
                .aggregates
                .as_ref()
                .map(|a| a.page_aggregates + a.visitor_aggregates)
                .unwrap_or(0),
            "Retention finished"
        );
    } else {
        warn!(today = %today, "Retention finished with errors");
    }
    true
}
