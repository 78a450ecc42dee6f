use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use visitstats_core::aggregate::{DimensionType, VisitorKey};
use visitstats_core::period;
use visitstats_engine::EngineError;

use crate::state::AppState;

/// Most days one tick aggregates; the rest are picked up by later ticks.
pub const MAX_CATCH_UP_DAYS: usize = 31;

/// Aggregate the oldest pending days up to yesterday, at most
/// [`MAX_CATCH_UP_DAYS`] of them. A day missed while the process was down,
/// or one that failed on an earlier tick, stays pending until it commits.
/// Returns the days this call committed.
pub async fn catch_up_days(state: &Arc<AppState>, today: NaiveDate) -> anyhow::Result<Vec<NaiveDate>> {
    let yesterday = today - Duration::days(1);
    let floor = state.config.retention_policy().raw_cutoff(today);
    let pending = state.engine.unaggregated_days(floor, yesterday).await?;
    if pending.len() > MAX_CATCH_UP_DAYS {
        info!(
            pending = pending.len(),
            oldest = %pending[0],
            "Aggregation backlog exceeds one tick; continuing next tick"
        );
    }

    let mut committed = Vec::new();
    for date in pending.into_iter().take(MAX_CATCH_UP_DAYS) {
        match state.engine.aggregate_day(date).await {
            Ok(report) if report.committed => committed.push(date),
            Ok(report) => warn!(
                date = %date,
                failures = report.failures().count(),
                "Day aggregated with failures; retrying next tick"
            ),
            Err(e) => warn!(date = %date, error = %e, "Day aggregation failed; retrying next tick"),
        }
    }
    Ok(committed)
}

/// Roll up the closed weeks, months and years that need it: the period that
/// ended yesterday when it has no record yet, and every closed period holding
/// a day in `committed`, which is rewritten. A period is rolled up only once
/// all of its days are in the run ledger.
pub async fn roll_up_closed_periods(
    state: &Arc<AppState>,
    today: NaiveDate,
    committed: &[NaiveDate],
) -> anyhow::Result<usize> {
    let yesterday = today - Duration::days(1);
    let mut written = 0;

    // Yearly reads the monthly rows, so months go first.
    for dimension in [DimensionType::Weekly, DimensionType::Monthly, DimensionType::Yearly] {
        let touched: BTreeSet<NaiveDate> = committed
            .iter()
            .map(|d| period::bucket_start(dimension, *d))
            .collect();
        let mut candidates = touched.clone();
        candidates.insert(period::bucket_start(dimension, yesterday));

        for start in candidates {
            let end = period::bucket_end(dimension, start);
            if end > yesterday {
                continue;
            }
            if !touched.contains(&start) {
                let key = VisitorKey::time_bucket(start, dimension)?;
                if state.db.find_visitor_aggregate(&key).await?.is_some() {
                    continue;
                }
            }
            let ledgered = state.db.aggregated_days(start, end).await?.len();
            let expected = period::days_in(start, end).len();
            if ledgered < expected {
                debug!(
                    dimension = %dimension,
                    period_start = %start,
                    missing_days = expected - ledgered,
                    "Period not fully aggregated yet"
                );
                continue;
            }

            match state.engine.aggregate_period(dimension, start).await {
                Ok(record) => {
                    info!(
                        dimension = %dimension,
                        period_start = %start,
                        total_visitors = record.total_visitors,
                        "Closed period rolled up"
                    );
                    written += 1;
                }
                Err(EngineError::IncompleteCoverage { missing, .. }) => {
                    warn!(
                        dimension = %dimension,
                        period_start = %start,
                        missing = missing.len(),
                        "Skipping period rollup until its days are aggregated"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(written)
}
