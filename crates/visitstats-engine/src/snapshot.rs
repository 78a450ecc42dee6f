use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use visitstats_core::event::VisitorEvent;

use crate::{Engine, EngineError, EngineResult};

/// Everything a day's rollups need, read once from the event store.
pub(crate) struct DaySnapshot {
    pub date: NaiveDate,
    /// Well-formed events only.
    pub events: Vec<VisitorEvent>,
    pub skipped_malformed: usize,
    /// Global event count per session, across every stored day.
    session_totals: HashMap<String, i64>,
    first_seen: HashMap<String, NaiveDate>,
}

impl DaySnapshot {
    /// A session bounced iff it has exactly one well-formed event in the whole store.
    pub fn is_bounced(&self, session_id: &str) -> bool {
        // The snapshot's own event is always stored, so a missing count is 1.
        self.session_totals.get(session_id).copied().unwrap_or(1) == 1
    }

    /// New iff the IP's first-ever event falls on the snapshot date.
    pub fn is_new(&self, ip: &str) -> bool {
        self.first_seen
            .get(ip)
            .map_or(true, |first| *first >= self.date)
    }
}

impl Engine {
    pub(crate) async fn load_day(&self, date: NaiveDate) -> EngineResult<DaySnapshot> {
        if let Some(pruned_before) = self.events.pruned_before().await? {
            if date < pruned_before {
                return Err(EngineError::RawEventsPruned {
                    date,
                    pruned_before,
                });
            }
        }

        let raw = self.events.find_by_date_range(date, date).await?;
        let total = raw.len();
        let events: Vec<VisitorEvent> = raw.into_iter().filter(|e| !e.is_malformed()).collect();
        let skipped_malformed = total - events.len();
        if skipped_malformed > 0 {
            tracing::warn!(date = %date, skipped = skipped_malformed, "Skipping malformed visitor events");
        }

        let sessions: Vec<String> = events
            .iter()
            .map(|e| e.session_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let ips: Vec<String> = events
            .iter()
            .map(|e| e.ip_address.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let session_totals = self.events.session_event_counts(&sessions).await?;
        let first_seen = self.events.first_seen_dates(&ips).await?;

        Ok(DaySnapshot {
            date,
            events,
            skipped_malformed,
            session_totals,
            first_seen,
        })
    }
}
