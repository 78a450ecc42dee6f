//! Period rollups built from other aggregates, never from raw events:
//! WEEKLY and MONTHLY from DAILY rows, YEARLY from MONTHLY rows.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use visitstats_core::aggregate::{DimensionType, VisitorAggregate, VisitorKey};
use visitstats_core::metrics;
use visitstats_core::period;

use crate::{Engine, EngineError, EngineResult};

/// Merge source rows into one record for `key`.
///
/// Counts are summed. Bounce rate and average session duration are averaged
/// weighted by `total_visitors`.
pub fn combine(key: VisitorKey, sources: &[VisitorAggregate]) -> VisitorAggregate {
    let mut record = VisitorAggregate::empty(key);
    for source in sources {
        record.total_visitors += source.total_visitors;
        record.unique_visitors += source.unique_visitors;
        record.total_page_views += source.total_page_views;
        record.new_visitors += source.new_visitors;
        record.returning_visitors += source.returning_visitors;
    }
    record.bounce_rate = metrics::round2(metrics::weighted_average(
        sources.iter().map(|s| (s.bounce_rate, s.total_visitors)),
    ));
    record.average_session_duration_ms = metrics::weighted_average(
        sources
            .iter()
            .map(|s| (s.average_session_duration_ms as f64, s.total_visitors)),
    )
    .round() as i64;
    record
}

/// Dimension a period rollup reads from, and the bucket starts it expects.
fn sources_of(dimension: DimensionType, start: NaiveDate) -> EngineResult<(DimensionType, Vec<NaiveDate>)> {
    let end = period::bucket_end(dimension, start);
    match dimension {
        DimensionType::Weekly | DimensionType::Monthly => {
            Ok((DimensionType::Daily, period::days_in(start, end)))
        }
        DimensionType::Yearly => Ok((
            DimensionType::Monthly,
            period::buckets_touching(DimensionType::Monthly, start, end),
        )),
        other => Err(EngineError::UnsupportedDimension(other)),
    }
}

impl Engine {
    /// Roll the ISO week (Monday start) containing `day` up from its DAILY
    /// rows.
    pub async fn aggregate_weekly(&self, day: NaiveDate) -> EngineResult<VisitorAggregate> {
        self.aggregate_period(DimensionType::Weekly, day).await
    }

    /// Roll the calendar month containing `month` up from its DAILY rows.
    pub async fn aggregate_monthly(&self, month: NaiveDate) -> EngineResult<VisitorAggregate> {
        self.aggregate_period(DimensionType::Monthly, month).await
    }

    /// Roll `year` up from its twelve MONTHLY rows.
    pub async fn aggregate_yearly(&self, year: i32) -> EngineResult<VisitorAggregate> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or(EngineError::InvalidYear(year))?;
        self.aggregate_period(DimensionType::Yearly, start).await
    }

    /// Recompute and upsert the `dimension` bucket containing `day`.
    ///
    /// Refuses with [`EngineError::IncompleteCoverage`] while any source row
    /// is missing, so a partial period is never stored as if it were whole.
    pub async fn aggregate_period(
        &self,
        dimension: DimensionType,
        day: NaiveDate,
    ) -> EngineResult<VisitorAggregate> {
        let start = period::bucket_start(dimension, day);
        let (source_dimension, expected) = sources_of(dimension, start)?;
        let end = period::bucket_end(dimension, start);

        let found: BTreeMap<NaiveDate, VisitorAggregate> = self
            .aggregates
            .visitor_aggregates_in_range(source_dimension, start, end)
            .await?
            .into_iter()
            .filter(|r| r.dimension_value.is_none())
            .map(|r| (r.date, r))
            .collect();

        let missing: Vec<NaiveDate> = expected
            .iter()
            .filter(|d| !found.contains_key(*d))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::IncompleteCoverage {
                dimension,
                period_start: start,
                missing,
            });
        }

        let sources: Vec<VisitorAggregate> = found.into_values().collect();
        let record = combine(VisitorKey::time_bucket(start, dimension)?, &sources);
        self.aggregates.upsert_visitor_aggregate(&record).await?;
        tracing::info!(
            dimension = %dimension,
            period_start = %start,
            total_visitors = record.total_visitors,
            "Rolled up period"
        );
        Ok(record)
    }
}
