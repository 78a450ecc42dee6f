//! Administrative re-aggregation of a date range.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};

use visitstats_core::aggregate::DimensionType;
use visitstats_core::period;

use crate::error::check_range;
use crate::report::{BackfillReport, DateFailure, PeriodRollup, RollupSkip};
use crate::{Engine, EngineResult};

impl Engine {
    /// Reprocess every day of `[start, end]`, then the weekly, monthly and
    /// yearly buckets the range touches.
    ///
    /// A failed day is listed in the report and never stops later days.
    pub async fn force_aggregation(&self, start: NaiveDate, end: NaiveDate) -> EngineResult<BackfillReport> {
        self.backfill(start, end, false).await
    }

    /// Like [`Engine::force_aggregation`], but days already in the run
    /// ledger are skipped, so an interrupted backfill picks up where it
    /// stopped.
    pub async fn resume_backfill(&self, start: NaiveDate, end: NaiveDate) -> EngineResult<BackfillReport> {
        self.backfill(start, end, true).await
    }

    /// Days up to `through` that still need a daily run, oldest first.
    ///
    /// Every date holding raw events that the run ledger lacks is pending,
    /// whatever its age. Quiet days are pending only from `floor` on, and
    /// never before the first day the store knows about (the oldest raw
    /// event or the oldest committed day) or the prune watermark.
    pub async fn unaggregated_days(&self, floor: NaiveDate, through: NaiveDate) -> EngineResult<Vec<NaiveDate>> {
        let event_days = self.events.event_dates_before(through + Duration::days(1)).await?;
        let oldest_event = event_days.first().copied();
        let ledger_from = oldest_event.map_or(floor, |d| d.min(floor));
        let committed = self.aggregates.aggregated_days(ledger_from, through).await?;

        let known_start = [oldest_event, committed.range(floor..).next().copied()]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(through);
        let mut start = known_start.max(floor);
        if let Some(watermark) = self.events.pruned_before().await? {
            start = start.max(watermark);
        }

        let mut pending: BTreeSet<NaiveDate> = event_days
            .into_iter()
            .filter(|d| !committed.contains(d))
            .collect();
        pending.extend(
            period::days_in(start, through)
                .into_iter()
                .filter(|d| !committed.contains(d)),
        );
        Ok(pending.into_iter().collect())
    }

    async fn backfill(&self, start: NaiveDate, end: NaiveDate, resume: bool) -> EngineResult<BackfillReport> {
        check_range(start, end)?;
        let mut report = BackfillReport::new(start, end);
        let done = if resume {
            self.aggregates.aggregated_days(start, end).await?
        } else {
            Default::default()
        };

        for date in period::days_in(start, end) {
            if done.contains(&date) {
                report.skipped.push(date);
                continue;
            }
            match self.aggregate_day(date).await {
                Ok(day) if day.committed => report.succeeded.push(date),
                Ok(day) => {
                    let reason = day
                        .failures()
                        .map(|f| format!("{}: {}", f.key, f.error))
                        .collect::<Vec<_>>()
                        .join("; ");
                    report.failed.push(DateFailure { date, reason });
                }
                Err(e) => {
                    tracing::warn!(date = %date, error = %e, "Backfill day failed");
                    report.failed.push(DateFailure {
                        date,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Yearly reads the monthly rows, so months go first.
        for dimension in [DimensionType::Weekly, DimensionType::Monthly, DimensionType::Yearly] {
            for period_start in period::buckets_touching(dimension, start, end) {
                match self.aggregate_period(dimension, period_start).await {
                    Ok(_) => report.rollups_written.push(PeriodRollup {
                        dimension,
                        period_start,
                    }),
                    Err(e) => report.rollups_skipped.push(RollupSkip {
                        dimension,
                        period_start,
                        reason: e.to_string(),
                    }),
                }
            }
        }

        tracing::info!(
            start = %start,
            end = %end,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            rollups = report.rollups_written.len(),
            "Backfill finished"
        );
        Ok(report)
    }
}
