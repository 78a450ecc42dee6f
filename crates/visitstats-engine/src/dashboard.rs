//! Read-only dashboard API. Every answer is computed from persisted
//! aggregates; raw events are never touched here.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use visitstats_core::aggregate::{DimensionType, VisitorAggregate};
use visitstats_core::metrics::{self, DimensionTotal, VisitorMix};
use visitstats_core::period;

use crate::error::check_range;
use crate::{Engine, EngineError, EngineResult};

/// Number of pages listed in a dashboard summary.
pub const TOP_PAGES_LIMIT: usize = 10;

/// Totals of the DAILY rows of a date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub total_visitors: i64,
    pub unique_visitors: i64,
    pub total_page_views: i64,
    pub new_visitors: i64,
    pub returning_visitors: i64,
    pub bounce_rate: f64,
    pub average_session_duration_ms: i64,
    /// Days of the range that have a DAILY row.
    pub days_covered: usize,
}

impl PeriodTotals {
    pub fn from_rows(rows: &[VisitorAggregate]) -> Self {
        let sum = |f: fn(&VisitorAggregate) -> i64| rows.iter().map(f).sum::<i64>();
        Self {
            total_visitors: sum(|r| r.total_visitors),
            unique_visitors: sum(|r| r.unique_visitors),
            total_page_views: sum(|r| r.total_page_views),
            new_visitors: sum(|r| r.new_visitors),
            returning_visitors: sum(|r| r.returning_visitors),
            bounce_rate: metrics::round2(metrics::weighted_average(
                rows.iter().map(|r| (r.bounce_rate, r.total_visitors)),
            )),
            average_session_duration_ms: metrics::weighted_average(
                rows.iter()
                    .map(|r| (r.average_session_duration_ms as f64, r.total_visitors)),
            )
            .round() as i64,
            days_covered: rows.len(),
        }
    }

    pub fn visitor_mix(&self) -> VisitorMix {
        VisitorMix::from_counts(
            self.new_visitors,
            self.returning_visitors,
            self.new_visitors + self.returning_visitors,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub page_path: String,
    pub total_views: i64,
    pub unique_visitors: i64,
    pub total_duration_ms: i64,
    /// Averaged over the range, weighted by views.
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub totals: PeriodTotals,
    pub visitor_mix: VisitorMix,
    pub top_pages: Vec<PageSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthPoint {
    pub date: NaiveDate,
    pub total_visitors: i64,
    pub unique_visitors: i64,
    pub total_page_views: i64,
    /// Against the preceding bucket; `None` when that bucket has no row.
    pub growth_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub previous_start: NaiveDate,
    pub previous_end: NaiveDate,
    pub current: PeriodTotals,
    pub previous: PeriodTotals,
    pub visitors_growth: f64,
    pub unique_visitors_growth: f64,
    pub page_views_growth: f64,
    /// Percentage points, current minus previous.
    pub bounce_rate_change: f64,
}

impl Engine {
    async fn daily_rows(&self, start: NaiveDate, end: NaiveDate) -> EngineResult<Vec<VisitorAggregate>> {
        Ok(self
            .aggregates
            .visitor_aggregates_in_range(DimensionType::Daily, start, end)
            .await?)
    }

    pub async fn get_dashboard_summary(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<DashboardSummary> {
        check_range(start, end)?;
        let totals = PeriodTotals::from_rows(&self.daily_rows(start, end).await?);

        let mut pages: BTreeMap<String, (PageSummary, f64)> = BTreeMap::new();
        for row in self.aggregates.page_aggregates_in_range(start, end).await? {
            let (summary, weighted_bounce) = pages.entry(row.page_path.clone()).or_insert_with(|| {
                (
                    PageSummary {
                        page_path: row.page_path.clone(),
                        total_views: 0,
                        unique_visitors: 0,
                        total_duration_ms: 0,
                        bounce_rate: 0.0,
                    },
                    0.0,
                )
            });
            summary.total_views += row.total_views;
            summary.unique_visitors += row.unique_visitors;
            summary.total_duration_ms += row.total_duration_ms;
            *weighted_bounce += row.bounce_rate * row.total_views as f64;
        }
        let mut top_pages: Vec<PageSummary> = pages
            .into_values()
            .map(|(mut summary, weighted_bounce)| {
                if summary.total_views > 0 {
                    summary.bounce_rate =
                        metrics::round2(weighted_bounce / summary.total_views as f64);
                }
                summary
            })
            .collect();
        top_pages.sort_by(|a, b| {
            b.total_views
                .cmp(&a.total_views)
                .then_with(|| a.page_path.cmp(&b.page_path))
        });
        top_pages.truncate(TOP_PAGES_LIMIT);

        Ok(DashboardSummary {
            start,
            end,
            visitor_mix: totals.visitor_mix(),
            totals,
            top_pages,
        })
    }

    /// One point per stored `dimension` bucket starting in `[start, end]`.
    ///
    /// Only time buckets (DAILY, WEEKLY, MONTHLY, YEARLY) have a trend.
    pub async fn get_growth_trend(
        &self,
        dimension: DimensionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<GrowthPoint>> {
        check_range(start, end)?;
        if !dimension.is_time_bucket() {
            return Err(EngineError::UnsupportedDimension(dimension));
        }
        let first = period::bucket_start(dimension, start);
        let lookback = period::previous_bucket_start(dimension, first);

        let rows: HashMap<NaiveDate, VisitorAggregate> = self
            .aggregates
            .visitor_aggregates_in_range(dimension, lookback, end)
            .await?
            .into_iter()
            .map(|r| (r.date, r))
            .collect();

        let mut points = Vec::new();
        for bucket in period::buckets_touching(dimension, first, end) {
            let Some(row) = rows.get(&bucket) else {
                continue;
            };
            let previous = rows.get(&period::previous_bucket_start(dimension, bucket));
            points.push(GrowthPoint {
                date: bucket,
                total_visitors: row.total_visitors,
                unique_visitors: row.unique_visitors,
                total_page_views: row.total_page_views,
                growth_rate: previous.map(|p| {
                    metrics::round2(metrics::growth_rate(
                        row.total_visitors as f64,
                        p.total_visitors as f64,
                    ))
                }),
            });
        }
        Ok(points)
    }

    /// Rank the values of HOURLY, COUNTRY or CITY over `[start, end]`.
    pub async fn get_top_dimension(
        &self,
        dimension: DimensionType,
        start: NaiveDate,
        end: NaiveDate,
        limit: usize,
    ) -> EngineResult<Vec<DimensionTotal>> {
        check_range(start, end)?;
        if !dimension.requires_value() {
            return Err(EngineError::UnsupportedDimension(dimension));
        }

        let mut totals: HashMap<String, DimensionTotal> = HashMap::new();
        for row in self
            .aggregates
            .visitor_aggregates_in_range(dimension, start, end)
            .await?
        {
            let Some(value) = row.dimension_value else {
                continue;
            };
            let entry = totals.entry(value.clone()).or_insert_with(|| DimensionTotal {
                value,
                total_visitors: 0,
                unique_visitors: 0,
                total_page_views: 0,
            });
            entry.total_visitors += row.total_visitors;
            entry.unique_visitors += row.unique_visitors;
            entry.total_page_views += row.total_page_views;
        }
        Ok(metrics::rank_dimension(
            dimension,
            totals.into_values().collect(),
            limit,
        ))
    }

    /// Compare `[start, end]` with the equally long window right before it.
    pub async fn get_comparison_with_previous_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<PeriodComparison> {
        check_range(start, end)?;
        let (previous_start, previous_end) = period::previous_period(start, end);
        let current = PeriodTotals::from_rows(&self.daily_rows(start, end).await?);
        let previous =
            PeriodTotals::from_rows(&self.daily_rows(previous_start, previous_end).await?);

        let growth = |c: i64, p: i64| metrics::round2(metrics::growth_rate(c as f64, p as f64));
        Ok(PeriodComparison {
            start,
            end,
            previous_start,
            previous_end,
            visitors_growth: growth(current.total_visitors, previous.total_visitors),
            unique_visitors_growth: growth(current.unique_visitors, previous.unique_visitors),
            page_views_growth: growth(current.total_page_views, previous.total_page_views),
            bounce_rate_change: metrics::round2(current.bounce_rate - previous.bounce_rate),
            current,
            previous,
        })
    }
}
