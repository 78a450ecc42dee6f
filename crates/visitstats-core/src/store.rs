//! Storage interfaces consumed by the aggregation engine.
//!
//! The self-hosted build backs both traits with one DuckDB database; they are
//! split because raw events and rollups have independent lifecycles.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::aggregate::{DimensionType, PageAggregate, PageKey, VisitorAggregate, VisitorKey};
use crate::event::VisitorEvent;

/// Append-only raw event storage.
///
/// All date arguments are inclusive UTC calendar days.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Append `events` and fold their timestamps into the first-seen index.
    /// Returns the number of rows written.
    async fn insert_events(&self, events: &[VisitorEvent]) -> anyhow::Result<usize>;

    async fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<VisitorEvent>>;

    async fn find_by_page(&self, page_path: &str) -> anyhow::Result<Vec<VisitorEvent>>;

    async fn count_distinct_ip_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<i64>;

    /// Earliest event ever recorded for `ip`, read from the first-seen index.
    async fn first_event_timestamp(&self, ip: &str) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Batch form of [`EventStore::first_event_timestamp`], reduced to dates.
    /// IPs absent from the index are absent from the map.
    async fn first_seen_dates(&self, ips: &[String]) -> anyhow::Result<HashMap<String, NaiveDate>>;

    /// Total number of well-formed events per session across the whole
    /// store, not just the window being aggregated. Malformed rows (see
    /// [`VisitorEvent::is_malformed`]) are not counted.
    async fn session_event_counts(
        &self,
        session_ids: &[String],
    ) -> anyhow::Result<HashMap<String, i64>>;

    /// Distinct dates strictly before `before` that still hold raw events.
    async fn event_dates_before(&self, before: NaiveDate) -> anyhow::Result<Vec<NaiveDate>>;

    /// Delete every event dated strictly before `before` and advance the
    /// prune watermark in the same transaction. Returns the deleted count.
    async fn delete_events_before(&self, before: NaiveDate) -> anyhow::Result<u64>;

    /// Raw events dated before this day have been pruned.
    async fn pruned_before(&self) -> anyhow::Result<Option<NaiveDate>>;
}

/// Rows removed by [`AggregateStore::delete_older_than`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrunedAggregates {
    pub page_aggregates: u64,
    pub visitor_aggregates: u64,
}

/// Keyed rollup storage. Every write replaces the full record for its key.
#[async_trait]
pub trait AggregateStore: Send + Sync + 'static {
    async fn find_page_aggregate(&self, key: &PageKey) -> anyhow::Result<Option<PageAggregate>>;

    async fn upsert_page_aggregate(&self, record: &PageAggregate) -> anyhow::Result<()>;

    async fn find_visitor_aggregate(
        &self,
        key: &VisitorKey,
    ) -> anyhow::Result<Option<VisitorAggregate>>;

    async fn upsert_visitor_aggregate(&self, record: &VisitorAggregate) -> anyhow::Result<()>;

    /// Atomically make `records` the complete set for `(date, dimension)`:
    /// each record is upserted and values no longer observed are removed.
    async fn replace_dimension(
        &self,
        date: NaiveDate,
        dimension: DimensionType,
        records: &[VisitorAggregate],
    ) -> anyhow::Result<()>;

    async fn page_aggregates_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<PageAggregate>>;

    /// Rows of one dimension type, ordered by date then dimension value.
    async fn visitor_aggregates_in_range(
        &self,
        dimension: DimensionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<VisitorAggregate>>;

    /// Delete page and visitor aggregates dated strictly before `before`,
    /// along with their run-ledger entries.
    async fn delete_older_than(&self, before: NaiveDate) -> anyhow::Result<PrunedAggregates>;

    /// Record that every raw-event rollup of `date` has committed.
    async fn mark_day_aggregated(&self, date: NaiveDate) -> anyhow::Result<()>;

    async fn aggregated_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<BTreeSet<NaiveDate>>;
}
