use thiserror::Error;

use crate::aggregate::DimensionType;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown dimension type: {0}")]
    UnknownDimension(String),

    #[error("{0} aggregates require a dimension value")]
    MissingDimensionValue(DimensionType),

    #[error("{0} aggregates do not take a dimension value")]
    UnexpectedDimensionValue(DimensionType),

    #[error("invalid hour of day: {0} (expected 0-23)")]
    InvalidHour(String),
}
