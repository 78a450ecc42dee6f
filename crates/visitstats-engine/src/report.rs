//! Serializable run reports. Nothing an aggregation run skips or fails to
//! write disappears silently: it is counted or listed here.

use chrono::NaiveDate;
use serde::Serialize;

use visitstats_core::aggregate::DimensionType;
use visitstats_core::store::PrunedAggregates;

/// Which rollup a [`RunReport`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunScope {
    Pages,
    Daily,
    Hourly,
    Country,
    City,
}

/// One key that could not be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub date: NaiveDate,
    pub scope: RunScope,
    pub written: usize,
    pub skipped_malformed: usize,
    pub failures: Vec<KeyFailure>,
}

impl RunReport {
    pub fn new(date: NaiveDate, scope: RunScope, skipped_malformed: usize) -> Self {
        Self {
            date,
            scope,
            written: 0,
            skipped_malformed,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Every raw-event rollup of one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayReport {
    pub date: NaiveDate,
    pub pages: RunReport,
    pub daily: RunReport,
    pub hourly: RunReport,
    pub country: RunReport,
    pub city: RunReport,
    /// The date was recorded in the run ledger.
    pub committed: bool,
}

impl DayReport {
    pub fn parts(&self) -> [&RunReport; 5] {
        [&self.pages, &self.daily, &self.hourly, &self.country, &self.city]
    }

    pub fn is_complete(&self) -> bool {
        self.parts().iter().all(|r| r.is_clean())
    }

    pub fn failures(&self) -> impl Iterator<Item = &KeyFailure> {
        self.parts().into_iter().flat_map(|r| r.failures.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateFailure {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRollup {
    pub dimension: DimensionType,
    pub period_start: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupSkip {
    pub dimension: DimensionType,
    pub period_start: NaiveDate,
    pub reason: String,
}

/// Outcome of a backfill over `[start, end]`, per date and per period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub succeeded: Vec<NaiveDate>,
    pub failed: Vec<DateFailure>,
    /// Dates already in the run ledger (resumed runs only).
    pub skipped: Vec<NaiveDate>,
    pub rollups_written: Vec<PeriodRollup>,
    pub rollups_skipped: Vec<RollupSkip>,
}

impl BackfillReport {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            rollups_written: Vec::new(),
            rollups_skipped: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawPruneOutcome {
    pub deleted: u64,
    pub requested_cutoff: NaiveDate,
    /// Lowered to the first date that still awaits aggregation.
    pub effective_cutoff: NaiveDate,
    pub blocked_dates: Vec<NaiveDate>,
}

/// Both retention steps run independently; each carries its own outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionReport {
    pub today: NaiveDate,
    pub raw_cutoff: NaiveDate,
    pub aggregate_cutoff: NaiveDate,
    pub raw: Result<RawPruneOutcome, String>,
    pub aggregates: Result<PrunedAggregates, String>,
}

impl RetentionReport {
    pub fn is_clean(&self) -> bool {
        self.raw.is_ok() && self.aggregates.is_ok()
    }
}
