//! Visitor rollups computed from one day of raw events: DAILY, HOURLY,
//! COUNTRY and CITY.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};

use visitstats_core::aggregate::{DimensionType, VisitorAggregate, VisitorKey};
use visitstats_core::event::VisitorEvent;
use visitstats_core::metrics;

use crate::report::{RunReport, RunScope};
use crate::snapshot::DaySnapshot;
use crate::{Engine, EngineError, EngineResult};

/// Fold a bucket of events into the record for `key`.
///
/// Session durations only see the session's events inside the bucket.
pub(crate) fn summarize<'a, I>(key: VisitorKey, events: I, snapshot: &DaySnapshot) -> VisitorAggregate
where
    I: IntoIterator<Item = &'a VisitorEvent>,
{
    let mut record = VisitorAggregate::empty(key);
    let mut visitors: HashSet<&str> = HashSet::new();
    let mut sessions: HashMap<&str, (DateTime<Utc>, DateTime<Utc>)> = HashMap::new();

    for event in events {
        record.total_visitors += 1;
        visitors.insert(&event.ip_address);
        sessions
            .entry(&event.session_id)
            .and_modify(|(first, last)| {
                *first = (*first).min(event.timestamp);
                *last = (*last).max(event.timestamp);
            })
            .or_insert((event.timestamp, event.timestamp));
    }

    record.total_page_views = record.total_visitors;
    record.unique_visitors = visitors.len() as i64;
    record.new_visitors = visitors.iter().filter(|ip| snapshot.is_new(ip)).count() as i64;
    record.returning_visitors = record.unique_visitors - record.new_visitors;

    if !sessions.is_empty() {
        let bounced = sessions.keys().filter(|s| snapshot.is_bounced(s)).count();
        record.bounce_rate = metrics::bounce_rate(bounced as i64, sessions.len() as i64);
        let total_ms: i64 = sessions
            .values()
            .map(|(first, last)| (*last - *first).num_milliseconds())
            .sum();
        record.average_session_duration_ms = total_ms / sessions.len() as i64;
    }
    record
}

/// Group a day's events by one dimension and summarize each group.
///
/// Events without a value for the dimension are left out of it.
pub(crate) fn dimension_aggregates(
    snapshot: &DaySnapshot,
    dimension: DimensionType,
) -> EngineResult<Vec<VisitorAggregate>> {
    if !matches!(
        dimension,
        DimensionType::Hourly | DimensionType::Country | DimensionType::City
    ) {
        return Err(EngineError::UnsupportedDimension(dimension));
    }

    let mut groups: BTreeMap<String, Vec<&VisitorEvent>> = BTreeMap::new();
    for event in &snapshot.events {
        let value = match dimension {
            DimensionType::Hourly => Some(event.hour().to_string()),
            DimensionType::Country => present(event.country.as_deref()),
            _ => present(event.city.as_deref()),
        };
        if let Some(value) = value {
            groups.entry(value).or_default().push(event);
        }
    }

    groups
        .into_iter()
        .map(|(value, events)| -> EngineResult<VisitorAggregate> {
            let key = VisitorKey::new(snapshot.date, dimension, Some(value))?;
            Ok(summarize(key, events, snapshot))
        })
        .collect()
}

fn present(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn scope_of(dimension: DimensionType) -> RunScope {
    match dimension {
        DimensionType::Hourly => RunScope::Hourly,
        DimensionType::Country => RunScope::Country,
        DimensionType::City => RunScope::City,
        _ => RunScope::Daily,
    }
}

impl Engine {
    /// Recompute the DAILY record of `date`. Written even when the day has
    /// no events, so a re-run over a quiet day resets it to zeros.
    pub async fn aggregate_daily(&self, date: NaiveDate) -> EngineResult<RunReport> {
        let snapshot = self.load_day(date).await?;
        self.write_daily(&snapshot).await
    }

    pub async fn aggregate_hourly(&self, date: NaiveDate) -> EngineResult<RunReport> {
        let snapshot = self.load_day(date).await?;
        self.write_dimension(&snapshot, DimensionType::Hourly).await
    }

    pub async fn aggregate_by_country(&self, date: NaiveDate) -> EngineResult<RunReport> {
        let snapshot = self.load_day(date).await?;
        self.write_dimension(&snapshot, DimensionType::Country).await
    }

    pub async fn aggregate_by_city(&self, date: NaiveDate) -> EngineResult<RunReport> {
        let snapshot = self.load_day(date).await?;
        self.write_dimension(&snapshot, DimensionType::City).await
    }

    pub(crate) async fn write_daily(&self, snapshot: &DaySnapshot) -> EngineResult<RunReport> {
        let record = summarize(
            VisitorKey::daily(snapshot.date),
            &snapshot.events,
            snapshot,
        );
        self.aggregates.upsert_visitor_aggregate(&record).await?;
        let mut report = RunReport::new(snapshot.date, RunScope::Daily, snapshot.skipped_malformed);
        report.written = 1;
        Ok(report)
    }

    /// Replace every value of `dimension` for the snapshot date in one
    /// atomic store call; values no longer observed are removed.
    pub(crate) async fn write_dimension(
        &self,
        snapshot: &DaySnapshot,
        dimension: DimensionType,
    ) -> EngineResult<RunReport> {
        let records = dimension_aggregates(snapshot, dimension)?;
        self.aggregates
            .replace_dimension(snapshot.date, dimension, &records)
            .await?;
        let mut report = RunReport::new(snapshot.date, scope_of(dimension), snapshot.skipped_malformed);
        report.written = records.len();
        Ok(report)
    }
}
