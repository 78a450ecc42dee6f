use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use visitstats_core::aggregate::{
    DimensionType, PageAggregate, PageKey, VisitorAggregate, VisitorKey,
};
use visitstats_core::event::VisitorEvent;
use visitstats_core::store::{AggregateStore, EventStore, PrunedAggregates};

use crate::DuckDbBackend;

#[async_trait]
impl EventStore for DuckDbBackend {
    async fn insert_events(&self, events: &[VisitorEvent]) -> anyhow::Result<usize> {
        DuckDbBackend::insert_events(self, events).await
    }

    async fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<VisitorEvent>> {
        DuckDbBackend::find_by_date_range(self, start, end).await
    }

    async fn find_by_page(&self, page_path: &str) -> anyhow::Result<Vec<VisitorEvent>> {
        DuckDbBackend::find_by_page(self, page_path).await
    }

    async fn count_distinct_ip_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<i64> {
        DuckDbBackend::count_distinct_ip_in_range(self, start, end).await
    }

    async fn first_event_timestamp(&self, ip: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        DuckDbBackend::first_event_timestamp(self, ip).await
    }

    async fn first_seen_dates(
        &self,
        ips: &[String],
    ) -> anyhow::Result<HashMap<String, NaiveDate>> {
        DuckDbBackend::first_seen_dates(self, ips).await
    }

    async fn session_event_counts(
        &self,
        session_ids: &[String],
    ) -> anyhow::Result<HashMap<String, i64>> {
        DuckDbBackend::session_event_counts(self, session_ids).await
    }

    async fn event_dates_before(&self, before: NaiveDate) -> anyhow::Result<Vec<NaiveDate>> {
        DuckDbBackend::event_dates_before(self, before).await
    }

    async fn delete_events_before(&self, before: NaiveDate) -> anyhow::Result<u64> {
        DuckDbBackend::delete_events_before(self, before).await
    }

    async fn pruned_before(&self) -> anyhow::Result<Option<NaiveDate>> {
        DuckDbBackend::pruned_before(self).await
    }
}

#[async_trait]
impl AggregateStore for DuckDbBackend {
    async fn find_page_aggregate(&self, key: &PageKey) -> anyhow::Result<Option<PageAggregate>> {
        DuckDbBackend::find_page_aggregate(self, key).await
    }

    async fn upsert_page_aggregate(&self, record: &PageAggregate) -> anyhow::Result<()> {
        DuckDbBackend::upsert_page_aggregate(self, record).await
    }

    async fn find_visitor_aggregate(
        &self,
        key: &VisitorKey,
    ) -> anyhow::Result<Option<VisitorAggregate>> {
        DuckDbBackend::find_visitor_aggregate(self, key).await
    }

    async fn upsert_visitor_aggregate(&self, record: &VisitorAggregate) -> anyhow::Result<()> {
        DuckDbBackend::upsert_visitor_aggregate(self, record).await
    }

    async fn replace_dimension(
        &self,
        date: NaiveDate,
        dimension: DimensionType,
        records: &[VisitorAggregate],
    ) -> anyhow::Result<()> {
        DuckDbBackend::replace_dimension(self, date, dimension, records).await
    }

    async fn page_aggregates_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<PageAggregate>> {
        DuckDbBackend::page_aggregates_in_range(self, start, end).await
    }

    async fn visitor_aggregates_in_range(
        &self,
        dimension: DimensionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<VisitorAggregate>> {
        DuckDbBackend::visitor_aggregates_in_range(self, dimension, start, end).await
    }

    async fn delete_older_than(&self, before: NaiveDate) -> anyhow::Result<PrunedAggregates> {
        DuckDbBackend::delete_older_than(self, before).await
    }

    async fn mark_day_aggregated(&self, date: NaiveDate) -> anyhow::Result<()> {
        DuckDbBackend::mark_day_aggregated(self, date).await
    }

    async fn aggregated_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<BTreeSet<NaiveDate>> {
        DuckDbBackend::aggregated_days(self, start, end).await
    }
}
