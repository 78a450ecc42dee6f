use std::collections::{BTreeSet, HashSet};

use anyhow::{bail, Result};
use chrono::NaiveDate;
use duckdb::Connection;

use visitstats_core::aggregate::{
    DimensionType, PageAggregate, PageKey, VisitorAggregate, VisitorKey,
};
use visitstats_core::store::PrunedAggregates;

use crate::backend::{date_param, parse_date};
use crate::DuckDbBackend;

const PAGE_COLUMNS: &str = "page_path, CAST(agg_date AS VARCHAR), total_views, unique_visitors, \
     total_duration_ms, bounce_rate";

const VISITOR_COLUMNS: &str = "CAST(agg_date AS VARCHAR), dimension_type, dimension_value, \
     total_visitors, unique_visitors, total_page_views, average_session_duration_ms, \
     bounce_rate, new_visitors, returning_visitors";

struct RawPageRow {
    page_path: String,
    agg_date: String,
    total_views: i64,
    unique_visitors: i64,
    total_duration_ms: i64,
    bounce_rate: f64,
}

impl RawPageRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            page_path: row.get(0)?,
            agg_date: row.get(1)?,
            total_views: row.get(2)?,
            unique_visitors: row.get(3)?,
            total_duration_ms: row.get(4)?,
            bounce_rate: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<PageAggregate> {
        Ok(PageAggregate {
            page_path: self.page_path,
            date: parse_date(&self.agg_date)?,
            total_views: self.total_views,
            unique_visitors: self.unique_visitors,
            total_duration_ms: self.total_duration_ms,
            bounce_rate: self.bounce_rate,
        })
    }
}

struct RawVisitorRow {
    agg_date: String,
    dimension_type: String,
    dimension_value: String,
    total_visitors: i64,
    unique_visitors: i64,
    total_page_views: i64,
    average_session_duration_ms: i64,
    bounce_rate: f64,
    new_visitors: i64,
    returning_visitors: i64,
}

impl RawVisitorRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            agg_date: row.get(0)?,
            dimension_type: row.get(1)?,
            dimension_value: row.get(2)?,
            total_visitors: row.get(3)?,
            unique_visitors: row.get(4)?,
            total_page_views: row.get(5)?,
            average_session_duration_ms: row.get(6)?,
            bounce_rate: row.get(7)?,
            new_visitors: row.get(8)?,
            returning_visitors: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<VisitorAggregate> {
        Ok(VisitorAggregate {
            date: parse_date(&self.agg_date)?,
            dimension_type: self.dimension_type.parse()?,
            dimension_value: stored_to_value(self.dimension_value),
            total_visitors: self.total_visitors,
            unique_visitors: self.unique_visitors,
            total_page_views: self.total_page_views,
            average_session_duration_ms: self.average_session_duration_ms,
            bounce_rate: self.bounce_rate,
            new_visitors: self.new_visitors,
            returning_visitors: self.returning_visitors,
        })
    }
}

fn value_to_stored(value: Option<&str>) -> &str {
    value.unwrap_or("")
}

fn stored_to_value(stored: String) -> Option<String> {
    if stored.is_empty() {
        None
    } else {
        Some(stored)
    }
}

fn upsert_visitor_row(conn: &Connection, record: &VisitorAggregate) -> Result<()> {
    conn.execute(
        r#"INSERT INTO visitor_aggregates (
            agg_date, dimension_type, dimension_value,
            total_visitors, unique_visitors, total_page_views,
            average_session_duration_ms, bounce_rate,
            new_visitors, returning_visitors
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT (agg_date, dimension_type, dimension_value) DO UPDATE SET
            total_visitors = EXCLUDED.total_visitors,
            unique_visitors = EXCLUDED.unique_visitors,
            total_page_views = EXCLUDED.total_page_views,
            average_session_duration_ms = EXCLUDED.average_session_duration_ms,
            bounce_rate = EXCLUDED.bounce_rate,
            new_visitors = EXCLUDED.new_visitors,
            returning_visitors = EXCLUDED.returning_visitors"#,
        duckdb::params![
            date_param(record.date),
            record.dimension_type.as_str(),
            value_to_stored(record.dimension_value.as_deref()),
            record.total_visitors,
            record.unique_visitors,
            record.total_page_views,
            record.average_session_duration_ms,
            record.bounce_rate,
            record.new_visitors,
            record.returning_visitors,
        ],
    )?;
    Ok(())
}

impl DuckDbBackend {
    pub async fn find_page_aggregate(&self, key: &PageKey) -> Result<Option<PageAggregate>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM page_aggregates WHERE page_path = ?1 AND agg_date = ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        match stmt.query_row(
            duckdb::params![key.page_path, date_param(key.date)],
            RawPageRow::from_row,
        ) {
            Ok(raw) => Ok(Some(raw.into_record()?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow::anyhow!(e)),
        }
    }

    /// Insert or fully overwrite the page rollup for its `(page_path, date)`.
    pub async fn upsert_page_aggregate(&self, record: &PageAggregate) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO page_aggregates (
                page_path, agg_date, total_views, unique_visitors, total_duration_ms, bounce_rate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (page_path, agg_date) DO UPDATE SET
                total_views = EXCLUDED.total_views,
                unique_visitors = EXCLUDED.unique_visitors,
                total_duration_ms = EXCLUDED.total_duration_ms,
                bounce_rate = EXCLUDED.bounce_rate"#,
            duckdb::params![
                record.page_path,
                date_param(record.date),
                record.total_views,
                record.unique_visitors,
                record.total_duration_ms,
                record.bounce_rate,
            ],
        )?;
        Ok(())
    }

    pub async fn find_visitor_aggregate(&self, key: &VisitorKey) -> Result<Option<VisitorAggregate>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {VISITOR_COLUMNS} FROM visitor_aggregates
             WHERE agg_date = ?1 AND dimension_type = ?2 AND dimension_value = ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        match stmt.query_row(
            duckdb::params![
                date_param(key.date),
                key.dimension_type.as_str(),
                value_to_stored(key.dimension_value.as_deref()),
            ],
            RawVisitorRow::from_row,
        ) {
            Ok(raw) => Ok(Some(raw.into_record()?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow::anyhow!(e)),
        }
    }

    /// Insert or fully overwrite the visitor rollup for its key.
    pub async fn upsert_visitor_aggregate(&self, record: &VisitorAggregate) -> Result<()> {
        let conn = self.conn.lock().await;
        upsert_visitor_row(&conn, record)
    }

    /// Make `records` the complete set of `(date, dimension)` rows in one
    /// transaction.
    ///
    /// Stale values are deleted before the upserts; a value is never deleted
    /// and re-inserted within the same transaction.
    pub async fn replace_dimension(
        &self,
        date: NaiveDate,
        dimension: DimensionType,
        records: &[VisitorAggregate],
    ) -> Result<()> {
        if let Some(bad) = records
            .iter()
            .find(|r| r.date != date || r.dimension_type != dimension)
        {
            bail!("record {} does not belong to {dimension}@{date}", bad.key());
        }
        let keep: HashSet<&str> = records
            .iter()
            .map(|r| value_to_stored(r.dimension_value.as_deref()))
            .collect();

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let existing: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT dimension_value FROM visitor_aggregates
                 WHERE agg_date = ?1 AND dimension_type = ?2",
            )?;
            let rows = stmt.query_map(
                duckdb::params![date_param(date), dimension.as_str()],
                |row| row.get::<_, String>(0),
            )?;
            rows.collect::<duckdb::Result<Vec<_>>>()?
        };
        for stale in existing.iter().filter(|v| !keep.contains(v.as_str())) {
            tx.execute(
                "DELETE FROM visitor_aggregates
                 WHERE agg_date = ?1 AND dimension_type = ?2 AND dimension_value = ?3",
                duckdb::params![date_param(date), dimension.as_str(), stale],
            )?;
        }
        for record in records {
            upsert_visitor_row(&tx, record)?;
        }

        tx.commit()?;
        Ok(())
    }

    pub async fn page_aggregates_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PageAggregate>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM page_aggregates
             WHERE agg_date >= ?1 AND agg_date <= ?2
             ORDER BY agg_date, page_path"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            duckdb::params![date_param(start), date_param(end)],
            RawPageRow::from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_record()?);
        }
        Ok(out)
    }

    pub async fn visitor_aggregates_in_range(
        &self,
        dimension: DimensionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<VisitorAggregate>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {VISITOR_COLUMNS} FROM visitor_aggregates
             WHERE dimension_type = ?1 AND agg_date >= ?2 AND agg_date <= ?3
             ORDER BY agg_date, dimension_value"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            duckdb::params![dimension.as_str(), date_param(start), date_param(end)],
            RawVisitorRow::from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_record()?);
        }
        Ok(out)
    }

    /// Delete every rollup (and ledger entry) dated before `before`.
    pub async fn delete_older_than(&self, before: NaiveDate) -> Result<PrunedAggregates> {
        let cutoff = date_param(before);
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let page_aggregates = tx.execute(
            "DELETE FROM page_aggregates WHERE agg_date < ?1",
            duckdb::params![cutoff],
        )?;
        let visitor_aggregates = tx.execute(
            "DELETE FROM visitor_aggregates WHERE agg_date < ?1",
            duckdb::params![cutoff],
        )?;
        tx.execute(
            "DELETE FROM aggregation_runs WHERE agg_date < ?1",
            duckdb::params![cutoff],
        )?;
        tx.commit()?;
        tracing::info!(
            before = %before,
            page_aggregates,
            visitor_aggregates,
            "Pruned aggregates"
        );
        Ok(PrunedAggregates {
            page_aggregates: page_aggregates as u64,
            visitor_aggregates: visitor_aggregates as u64,
        })
    }

    pub async fn mark_day_aggregated(&self, date: NaiveDate) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO aggregation_runs (agg_date, completed_at) VALUES (?1, CURRENT_TIMESTAMP)
             ON CONFLICT (agg_date) DO UPDATE SET completed_at = EXCLUDED.completed_at",
            duckdb::params![date_param(date)],
        )?;
        Ok(())
    }

    pub async fn aggregated_days(&self, start: NaiveDate, end: NaiveDate) -> Result<BTreeSet<NaiveDate>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT CAST(agg_date AS VARCHAR) FROM aggregation_runs
             WHERE agg_date >= ?1 AND agg_date <= ?2",
        )?;
        let rows = stmt.query_map(
            duckdb::params![date_param(start), date_param(end)],
            |row| row.get::<_, String>(0),
        )?;
        let mut days = BTreeSet::new();
        for row in rows {
            days.insert(parse_date(&row?)?);
        }
        Ok(days)
    }
}
