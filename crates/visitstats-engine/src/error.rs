use chrono::NaiveDate;
use thiserror::Error;

use visitstats_core::aggregate::DimensionType;
use visitstats_core::error::CoreError;

/// Errors that abort a whole engine call.
///
/// Failures scoped to a single key are not errors: they are collected into
/// the run report and the remaining keys are still written.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store unavailable: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Re-aggregating would overwrite the stored rollups with zeros.
    #[error("raw events for {date} were pruned (watermark {pruned_before}); refusing to re-aggregate")]
    RawEventsPruned {
        date: NaiveDate,
        pruned_before: NaiveDate,
    },

    #[error("{dimension} rollup starting {period_start} is missing {} source rows", missing.len())]
    IncompleteCoverage {
        dimension: DimensionType,
        period_start: NaiveDate,
        missing: Vec<NaiveDate>,
    },

    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid year: {0}")]
    InvalidYear(i32),

    #[error("dimension {0} is not supported by this operation")]
    UnsupportedDimension(DimensionType),
}

pub type EngineResult<T> = Result<T, EngineError>;

pub(crate) fn check_range(start: NaiveDate, end: NaiveDate) -> EngineResult<()> {
    if end < start {
        return Err(EngineError::InvalidRange { start, end });
    }
    Ok(())
}
