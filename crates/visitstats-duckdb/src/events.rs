use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use visitstats_core::event::VisitorEvent;

use crate::backend::{
    date_param, parse_date, parse_ts, placeholders, read_setting, ts_param, write_setting,
    RAW_PRUNED_BEFORE_KEY,
};
use crate::DuckDbBackend;

/// Upper bound on bound parameters per `IN (...)` lookup.
const LOOKUP_CHUNK: usize = 500;

const EVENT_COLUMNS: &str = "ip_address, CAST(occurred_at AS VARCHAR), page_path, session_id, \
     country, city, referrer, device_type, duration_ms";

/// Row as read from DuckDB, before the timestamp string is parsed.
struct RawEventRow {
    ip_address: String,
    occurred_at: String,
    page_path: Option<String>,
    session_id: String,
    country: Option<String>,
    city: Option<String>,
    referrer: Option<String>,
    device_type: Option<String>,
    duration_ms: Option<i64>,
}

impl RawEventRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            ip_address: row.get(0)?,
            occurred_at: row.get(1)?,
            page_path: row.get(2)?,
            session_id: row.get(3)?,
            country: row.get(4)?,
            city: row.get(5)?,
            referrer: row.get(6)?,
            device_type: row.get(7)?,
            duration_ms: row.get(8)?,
        })
    }

    fn into_event(self) -> Result<VisitorEvent> {
        Ok(VisitorEvent {
            ip_address: self.ip_address,
            timestamp: parse_ts(&self.occurred_at)?,
            page_path: self.page_path,
            session_id: self.session_id,
            country: self.country,
            city: self.city,
            referrer: self.referrer,
            device_type: self.device_type,
            duration_ms: self.duration_ms,
        })
    }
}

/// Half-open bind strings `[start 00:00, end+1 00:00)` for an inclusive day range.
fn day_bounds(start: NaiveDate, end: NaiveDate) -> (String, String) {
    (date_param(start), date_param(end + Duration::days(1)))
}

impl DuckDbBackend {
    /// Insert a batch of events in a single transaction and fold them into
    /// the `visitor_first_seen` index.
    ///
    /// The index is reduced per IP in Rust first so each IP is upserted once
    /// per batch. Returns immediately (no-op) if `events` is empty.
    pub async fn insert_events(&self, events: &[VisitorEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut first_seen: BTreeMap<&str, DateTime<Utc>> = BTreeMap::new();
        for event in events {
            first_seen
                .entry(event.ip_address.as_str())
                .and_modify(|ts| *ts = (*ts).min(event.timestamp))
                .or_insert(event.timestamp);
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        for event in events {
            tx.execute(
                r#"INSERT INTO visitor_events (
                    id, ip_address, occurred_at, page_path, session_id,
                    country, city, referrer, device_type, duration_ms
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                duckdb::params![
                    uuid::Uuid::new_v4().to_string(),
                    event.ip_address,
                    ts_param(event.timestamp),
                    event.page_path,
                    event.session_id,
                    event.country,
                    event.city,
                    event.referrer,
                    event.device_type,
                    event.duration_ms,
                ],
            )?;
        }

        for (ip, ts) in &first_seen {
            tx.execute(
                r#"INSERT INTO visitor_first_seen (ip_address, first_seen_at)
                   VALUES (?1, ?2)
                   ON CONFLICT (ip_address) DO UPDATE
                   SET first_seen_at = LEAST(visitor_first_seen.first_seen_at, EXCLUDED.first_seen_at)"#,
                duckdb::params![ip, ts_param(*ts)],
            )?;
        }

        tx.commit()?;
        tracing::debug!(
            count = events.len(),
            visitors = first_seen.len(),
            "Inserted visitor events"
        );
        Ok(events.len())
    }

    /// Events whose UTC date falls in `[start, end]`, oldest first.
    pub async fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<VisitorEvent>> {
        let (from, until) = day_bounds(start, end);
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM visitor_events
             WHERE occurred_at >= ?1 AND occurred_at < ?2
             ORDER BY occurred_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params![from, until], RawEventRow::from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    /// Every stored event for `page_path`, oldest first.
    pub async fn find_by_page(&self, page_path: &str) -> Result<Vec<VisitorEvent>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM visitor_events
             WHERE page_path = ?1
             ORDER BY occurred_at, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(duckdb::params![page_path], RawEventRow::from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    pub async fn count_distinct_ip_in_range(&self, start: NaiveDate, end: NaiveDate) -> Result<i64> {
        let (from, until) = day_bounds(start, end);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT COUNT(DISTINCT ip_address) FROM visitor_events
             WHERE occurred_at >= ?1 AND occurred_at < ?2",
        )?;
        let count: i64 = stmt.query_row(duckdb::params![from, until], |row| row.get(0))?;
        Ok(count)
    }

    pub async fn first_event_timestamp(&self, ip: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT CAST(first_seen_at AS VARCHAR) FROM visitor_first_seen WHERE ip_address = ?1",
        )?;
        match stmt.query_row(duckdb::params![ip], |row| row.get::<_, String>(0)) {
            Ok(raw) => Ok(Some(parse_ts(&raw)?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow::anyhow!(e)),
        }
    }

    pub async fn first_seen_dates(&self, ips: &[String]) -> Result<HashMap<String, NaiveDate>> {
        let mut out = HashMap::with_capacity(ips.len());
        if ips.is_empty() {
            return Ok(out);
        }
        let conn = self.conn.lock().await;
        for chunk in ips.chunks(LOOKUP_CHUNK) {
            let sql = format!(
                "SELECT ip_address, CAST(CAST(first_seen_at AS DATE) AS VARCHAR)
                 FROM visitor_first_seen
                 WHERE ip_address IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(duckdb::params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (ip, day) = row?;
                out.insert(ip, parse_date(&day)?);
            }
        }
        Ok(out)
    }

    /// Rows without a usable page path or IP are left out of the count, the
    /// same rows the aggregators skip.
    pub async fn session_event_counts(&self, session_ids: &[String]) -> Result<HashMap<String, i64>> {
        let mut out = HashMap::with_capacity(session_ids.len());
        if session_ids.is_empty() {
            return Ok(out);
        }
        let conn = self.conn.lock().await;
        for chunk in session_ids.chunks(LOOKUP_CHUNK) {
            let sql = format!(
                "SELECT session_id, COUNT(*) FROM visitor_events
                 WHERE session_id IN ({})
                   AND TRIM(COALESCE(page_path, '')) <> ''
                   AND TRIM(ip_address) <> ''
                 GROUP BY session_id",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(duckdb::params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (session_id, count) = row?;
                out.insert(session_id, count);
            }
        }
        Ok(out)
    }

    pub async fn event_dates_before(&self, before: NaiveDate) -> Result<Vec<NaiveDate>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT CAST(CAST(occurred_at AS DATE) AS VARCHAR) AS day
             FROM visitor_events
             WHERE occurred_at < ?1
             ORDER BY day",
        )?;
        let rows = stmt.query_map(duckdb::params![date_param(before)], |row| {
            row.get::<_, String>(0)
        })?;
        let mut days = Vec::new();
        for row in rows {
            days.push(parse_date(&row?)?);
        }
        Ok(days)
    }

    /// Delete raw events dated before `before` and move the prune watermark
    /// forward (never backward) in the same transaction.
    ///
    /// The `visitor_first_seen` index is left untouched: it is the only
    /// record of a visitor's first visit once their events age out.
    pub async fn delete_events_before(&self, before: NaiveDate) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM visitor_events WHERE occurred_at < ?1",
            duckdb::params![date_param(before)],
        )?;
        let watermark = match read_setting(&tx, RAW_PRUNED_BEFORE_KEY)? {
            Some(raw) => parse_date(&raw)?.max(before),
            None => before,
        };
        write_setting(&tx, RAW_PRUNED_BEFORE_KEY, &date_param(watermark))?;
        tx.commit()?;
        tracing::info!(deleted, before = %before, "Pruned raw visitor events");
        Ok(deleted as u64)
    }

    pub async fn pruned_before(&self) -> Result<Option<NaiveDate>> {
        let conn = self.conn.lock().await;
        read_setting(&conn, RAW_PRUNED_BEFORE_KEY)?
            .map(|raw| parse_date(&raw))
            .transpose()
    }
}
