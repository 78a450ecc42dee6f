//! Calendar arithmetic for time buckets. All dates are UTC calendar days.

use chrono::{Datelike, Duration, Months, NaiveDate};

use crate::aggregate::DimensionType;

/// First day of the bucket of `dimension` that contains `date`.
///
/// WEEKLY buckets are ISO weeks (Monday start). Non-time dimensions are
/// bucketed per day.
pub fn bucket_start(dimension: DimensionType, date: NaiveDate) -> NaiveDate {
    match dimension {
        DimensionType::Weekly => {
            date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
        }
        DimensionType::Monthly => date.with_day(1).unwrap_or(date),
        DimensionType::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        DimensionType::Daily
        | DimensionType::Hourly
        | DimensionType::Country
        | DimensionType::City => date,
    }
}

/// First day of the bucket following the one starting at `start`.
pub fn next_bucket_start(dimension: DimensionType, start: NaiveDate) -> NaiveDate {
    let start = bucket_start(dimension, start);
    match dimension {
        DimensionType::Weekly => start + Duration::days(7),
        DimensionType::Monthly => start.checked_add_months(Months::new(1)).unwrap_or(start),
        DimensionType::Yearly => start.checked_add_months(Months::new(12)).unwrap_or(start),
        _ => start + Duration::days(1),
    }
}

/// First day of the bucket preceding the one starting at `start`.
pub fn previous_bucket_start(dimension: DimensionType, start: NaiveDate) -> NaiveDate {
    let start = bucket_start(dimension, start);
    match dimension {
        DimensionType::Weekly => start - Duration::days(7),
        DimensionType::Monthly => start.checked_sub_months(Months::new(1)).unwrap_or(start),
        DimensionType::Yearly => start.checked_sub_months(Months::new(12)).unwrap_or(start),
        _ => start - Duration::days(1),
    }
}

/// Last day (inclusive) of the bucket starting at `start`.
pub fn bucket_end(dimension: DimensionType, start: NaiveDate) -> NaiveDate {
    next_bucket_start(dimension, start) - Duration::days(1)
}

/// Every calendar day in `[start, end]`, empty when `end < start`.
pub fn days_in(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Start dates of every `dimension` bucket overlapping `[start, end]`.
pub fn buckets_touching(dimension: DimensionType, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut buckets = Vec::new();
    if end < start {
        return buckets;
    }
    let mut current = bucket_start(dimension, start);
    while current <= end {
        buckets.push(current);
        let next = next_bucket_start(dimension, current);
        if next <= current {
            break;
        }
        current = next;
    }
    buckets
}

/// The equal-length window immediately preceding `[start, end]`:
/// `[start - len, start - 1]` where `len = end - start + 1` days.
pub fn previous_period(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let days = (end - start).num_days() + 1;
    let prev_end = start - Duration::days(1);
    let prev_start = prev_end - Duration::days(days - 1);
    (prev_start, prev_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn weekly_buckets_start_on_monday() {
        // 2024-01-04 is a Thursday.
        assert_eq!(bucket_start(DimensionType::Weekly, d(2024, 1, 4)), d(2024, 1, 1));
        assert_eq!(bucket_end(DimensionType::Weekly, d(2024, 1, 1)), d(2024, 1, 7));
    }

    #[test]
    fn monthly_bucket_handles_leap_february() {
        assert_eq!(bucket_start(DimensionType::Monthly, d(2024, 2, 17)), d(2024, 2, 1));
        assert_eq!(bucket_end(DimensionType::Monthly, d(2024, 2, 1)), d(2024, 2, 29));
        assert_eq!(previous_bucket_start(DimensionType::Monthly, d(2024, 3, 1)), d(2024, 2, 1));
    }

    #[test]
    fn yearly_bucket_spans_the_calendar_year() {
        assert_eq!(bucket_start(DimensionType::Yearly, d(2023, 7, 9)), d(2023, 1, 1));
        assert_eq!(bucket_end(DimensionType::Yearly, d(2023, 1, 1)), d(2023, 12, 31));
    }

    #[test]
    fn days_in_is_inclusive_and_empty_for_reversed_ranges() {
        assert_eq!(days_in(d(2024, 1, 30), d(2024, 2, 1)).len(), 3);
        assert!(days_in(d(2024, 2, 1), d(2024, 1, 30)).is_empty());
    }

    #[test]
    fn months_touching_a_range() {
        let months = buckets_touching(DimensionType::Monthly, d(2024, 1, 20), d(2024, 3, 2));
        assert_eq!(months, vec![d(2024, 1, 1), d(2024, 2, 1), d(2024, 3, 1)]);
    }

    #[test]
    fn previous_period_is_adjacent_and_equal_length() {
        assert_eq!(
            previous_period(d(2024, 1, 8), d(2024, 1, 14)),
            (d(2024, 1, 1), d(2024, 1, 7))
        );
        assert_eq!(previous_period(d(2024, 3, 1), d(2024, 3, 1)), (d(2024, 2, 29), d(2024, 2, 29)));
    }
}
