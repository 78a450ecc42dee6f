use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A raw page view as written by the ingestion path. Mirrors the DuckDB
/// `visitor_events` table columns.
///
/// Country and city are already resolved by the geolocation layer before the
/// event reaches the store. Events are never mutated after insert; only the
/// retention manager deletes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorEvent {
    pub ip_address: String,
    pub timestamp: DateTime<Utc>,
    /// `None` (or blank) marks the event as malformed; aggregators skip it.
    pub page_path: Option<String>,
    pub session_id: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub referrer: Option<String>,
    pub device_type: Option<String>,
    /// Client-reported time spent on the page, when the tracker sends it.
    pub duration_ms: Option<i64>,
}

impl VisitorEvent {
    /// Build a well-formed page view with the optional fields left empty.
    pub fn page_view(
        ip_address: impl Into<String>,
        session_id: impl Into<String>,
        page_path: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            ip_address: ip_address.into(),
            timestamp,
            page_path: Some(page_path.into()),
            session_id: session_id.into(),
            country: None,
            city: None,
            referrer: None,
            device_type: None,
            duration_ms: None,
        }
    }

    /// The page path, or `None` when the event cannot be attributed to a page.
    pub fn page(&self) -> Option<&str> {
        self.page_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// An event without a page path or visitor IP cannot contribute to any
    /// rollup and is counted as skipped instead.
    pub fn is_malformed(&self) -> bool {
        self.page().is_none() || self.ip_address.trim().is_empty()
    }

    /// UTC calendar date of the event.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// UTC hour of day, 0–23.
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}
