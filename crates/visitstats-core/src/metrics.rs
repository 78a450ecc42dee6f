//! Derived metrics. Pure functions over counts already read from the
//! aggregate store; none of these touch raw events.

use std::cmp::Ordering;

use serde::Serialize;

use crate::aggregate::{parse_hour, DimensionType};

/// Round to two decimal places, the precision percentages are stored with.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / total * 100`, or `0.0` when `total` is zero.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

/// Share of bounced sessions, 0–100, rounded to two decimals.
pub fn bounce_rate(bounced_sessions: i64, total_sessions: i64) -> f64 {
    round2(percentage(bounced_sessions, total_sessions))
}

/// Period-over-period growth in percent.
///
/// A zero `previous` always yields `100.0`, including the zero-to-zero case.
pub fn growth_rate(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 100.0;
    }
    (current - previous) / previous * 100.0
}

/// Weighted mean of `(value, weight)` samples.
///
/// Falls back to the simple mean when every weight is zero, and to `0.0` for
/// no samples at all.
pub fn weighted_average<I>(samples: I) -> f64
where
    I: IntoIterator<Item = (f64, i64)>,
{
    let samples: Vec<(f64, i64)> = samples.into_iter().collect();
    if samples.is_empty() {
        return 0.0;
    }
    let total_weight: i64 = samples.iter().map(|(_, w)| *w).sum();
    if total_weight == 0 {
        return samples.iter().map(|(v, _)| *v).sum::<f64>() / samples.len() as f64;
    }
    samples.iter().map(|(v, w)| v * *w as f64).sum::<f64>() / total_weight as f64
}

/// New vs returning split of a visitor population, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisitorMix {
    pub new_rate: f64,
    pub returning_rate: f64,
}

impl VisitorMix {
    /// Both rates are `0.0` when `total` is zero.
    pub fn from_counts(new_visitors: i64, returning_visitors: i64, total: i64) -> Self {
        Self {
            new_rate: round2(percentage(new_visitors, total)),
            returning_rate: round2(percentage(returning_visitors, total)),
        }
    }
}

/// One row of a top-N dimension ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionTotal {
    pub value: String,
    pub total_visitors: i64,
    pub unique_visitors: i64,
    pub total_page_views: i64,
}

/// Order dimension values ascending. Hours compare numerically so that
/// `"9"` sorts before `"10"`.
pub fn compare_dimension_values(dimension: DimensionType, a: &str, b: &str) -> Ordering {
    if dimension == DimensionType::Hourly {
        if let (Ok(x), Ok(y)) = (parse_hour(a), parse_hour(b)) {
            return x.cmp(&y);
        }
    }
    a.cmp(b)
}

/// Sort by `total_visitors` descending, ties by value ascending, then keep
/// the first `limit` rows. The ordering is total, so equal inputs always
/// produce the same ranking.
pub fn rank_dimension(
    dimension: DimensionType,
    mut rows: Vec<DimensionTotal>,
    limit: usize,
) -> Vec<DimensionTotal> {
    rows.sort_by(|a, b| {
        b.total_visitors
            .cmp(&a.total_visitors)
            .then_with(|| compare_dimension_values(dimension, &a.value, &b.value))
    });
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: &str, visitors: i64) -> DimensionTotal {
        DimensionTotal {
            value: value.to_string(),
            total_visitors: visitors,
            unique_visitors: visitors,
            total_page_views: visitors,
        }
    }

    #[test]
    fn growth_rate_from_zero_is_one_hundred() {
        assert_eq!(growth_rate(0.0, 0.0), 100.0);
        assert_eq!(growth_rate(5.0, 0.0), 100.0);
    }

    #[test]
    fn growth_rate_standard_cases() {
        assert_eq!(growth_rate(10.0, 5.0), 100.0);
        assert_eq!(growth_rate(5.0, 10.0), -50.0);
        assert_eq!(growth_rate(7.0, 7.0), 0.0);
    }

    #[test]
    fn bounce_rate_handles_zero_sessions() {
        assert_eq!(bounce_rate(0, 0), 0.0);
        assert_eq!(bounce_rate(1, 3), 33.33);
        assert_eq!(bounce_rate(2, 2), 100.0);
    }

    #[test]
    fn visitor_mix_is_zero_for_empty_population() {
        let mix = VisitorMix::from_counts(0, 0, 0);
        assert_eq!(mix.new_rate, 0.0);
        assert_eq!(mix.returning_rate, 0.0);

        let mix = VisitorMix::from_counts(1, 3, 4);
        assert_eq!(mix.new_rate, 25.0);
        assert_eq!(mix.returning_rate, 75.0);
    }

    #[test]
    fn weighted_average_falls_back_to_simple_mean() {
        assert_eq!(weighted_average(Vec::new()), 0.0);
        assert_eq!(weighted_average(vec![(50.0, 0), (100.0, 0)]), 75.0);
        assert_eq!(weighted_average(vec![(100.0, 1), (0.0, 3)]), 25.0);
    }

    #[test]
    fn ranking_breaks_ties_by_value() {
        let ranked = rank_dimension(
            DimensionType::Country,
            vec![row("US", 5), row("DE", 9), row("CA", 5), row("PL", 1)],
            3,
        );
        let order: Vec<&str> = ranked.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(order, vec!["DE", "CA", "US"]);
    }

    #[test]
    fn hourly_ties_sort_numerically() {
        let ranked = rank_dimension(
            DimensionType::Hourly,
            vec![row("10", 4), row("9", 4), row("23", 7)],
            10,
        );
        let order: Vec<&str> = ranked.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(order, vec!["23", "9", "10"]);
    }
}
