//! Rollup records and their composite keys.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Axis a [`VisitorAggregate`] is bucketed on.
///
/// The first four are pure time buckets keyed only by their start date; the
/// last three additionally carry a dimension value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DimensionType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Hourly,
    Country,
    City,
}

impl DimensionType {
    pub const ALL: [DimensionType; 7] = [
        DimensionType::Daily,
        DimensionType::Weekly,
        DimensionType::Monthly,
        DimensionType::Yearly,
        DimensionType::Hourly,
        DimensionType::Country,
        DimensionType::City,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DimensionType::Daily => "DAILY",
            DimensionType::Weekly => "WEEKLY",
            DimensionType::Monthly => "MONTHLY",
            DimensionType::Yearly => "YEARLY",
            DimensionType::Hourly => "HOURLY",
            DimensionType::Country => "COUNTRY",
            DimensionType::City => "CITY",
        }
    }

    /// `true` for DAILY/WEEKLY/MONTHLY/YEARLY.
    pub fn is_time_bucket(self) -> bool {
        matches!(
            self,
            DimensionType::Daily
                | DimensionType::Weekly
                | DimensionType::Monthly
                | DimensionType::Yearly
        )
    }

    pub fn requires_value(self) -> bool {
        !self.is_time_bucket()
    }
}

impl fmt::Display for DimensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DimensionType {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let upper = raw.trim().to_ascii_uppercase();
        DimensionType::ALL
            .into_iter()
            .find(|d| d.as_str() == upper)
            .ok_or_else(|| CoreError::UnknownDimension(raw.to_string()))
    }
}

/// Identity of a [`PageAggregate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageKey {
    pub page_path: String,
    pub date: NaiveDate,
}

impl PageKey {
    pub fn new(page_path: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            page_path: page_path.into(),
            date,
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.page_path, self.date)
    }
}

/// Per-page daily rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAggregate {
    pub page_path: String,
    pub date: NaiveDate,
    pub total_views: i64,
    pub unique_visitors: i64,
    pub total_duration_ms: i64,
    /// Percentage, 0–100.
    pub bounce_rate: f64,
}

impl PageAggregate {
    pub fn key(&self) -> PageKey {
        PageKey::new(self.page_path.clone(), self.date)
    }
}

/// Identity of a [`VisitorAggregate`].
///
/// Construct through [`VisitorKey::new`] (or the typed helpers) so the
/// value/no-value rule of the dimension is always upheld.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisitorKey {
    pub date: NaiveDate,
    pub dimension_type: DimensionType,
    pub dimension_value: Option<String>,
}

impl VisitorKey {
    pub fn new(
        date: NaiveDate,
        dimension_type: DimensionType,
        dimension_value: Option<String>,
    ) -> Result<Self, CoreError> {
        let dimension_value = match (dimension_type.requires_value(), dimension_value) {
            (true, None) => return Err(CoreError::MissingDimensionValue(dimension_type)),
            (false, Some(_)) => return Err(CoreError::UnexpectedDimensionValue(dimension_type)),
            (false, None) => None,
            (true, Some(v)) if dimension_type == DimensionType::Hourly => {
                Some(parse_hour(&v)?.to_string())
            }
            (true, Some(v)) => {
                if v.trim().is_empty() {
                    return Err(CoreError::MissingDimensionValue(dimension_type));
                }
                Some(v)
            }
        };
        Ok(Self {
            date,
            dimension_type,
            dimension_value,
        })
    }

    /// Key of a pure time bucket (DAILY, WEEKLY, MONTHLY, YEARLY).
    pub fn time_bucket(date: NaiveDate, dimension_type: DimensionType) -> Result<Self, CoreError> {
        Self::new(date, dimension_type, None)
    }

    pub fn daily(date: NaiveDate) -> Self {
        Self {
            date,
            dimension_type: DimensionType::Daily,
            dimension_value: None,
        }
    }

    pub fn hourly(date: NaiveDate, hour: u32) -> Result<Self, CoreError> {
        Self::new(date, DimensionType::Hourly, Some(hour.to_string()))
    }
}

impl fmt::Display for VisitorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dimension_value {
            Some(v) => write!(f, "{}:{}@{}", self.dimension_type, v, self.date),
            None => write!(f, "{}@{}", self.dimension_type, self.date),
        }
    }
}

/// Parse an HOURLY dimension value.
pub fn parse_hour(raw: &str) -> Result<u32, CoreError> {
    match raw.trim().parse::<u32>() {
        Ok(h) if h < 24 => Ok(h),
        _ => Err(CoreError::InvalidHour(raw.to_string())),
    }
}

/// Visitor rollup for one time bucket and/or dimension value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorAggregate {
    pub date: NaiveDate,
    pub dimension_type: DimensionType,
    pub dimension_value: Option<String>,
    pub total_visitors: i64,
    pub unique_visitors: i64,
    pub total_page_views: i64,
    pub average_session_duration_ms: i64,
    /// Percentage, 0–100.
    pub bounce_rate: f64,
    pub new_visitors: i64,
    pub returning_visitors: i64,
}

impl VisitorAggregate {
    /// A zeroed record for `key`, the starting point of every recompute.
    pub fn empty(key: VisitorKey) -> Self {
        Self {
            date: key.date,
            dimension_type: key.dimension_type,
            dimension_value: key.dimension_value,
            total_visitors: 0,
            unique_visitors: 0,
            total_page_views: 0,
            average_session_duration_ms: 0,
            bounce_rate: 0.0,
            new_visitors: 0,
            returning_visitors: 0,
        }
    }

    pub fn key(&self) -> VisitorKey {
        VisitorKey {
            date: self.date,
            dimension_type: self.dimension_type,
            dimension_value: self.dimension_value.clone(),
        }
    }
}
