//! Per-page daily rollups.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use visitstats_core::aggregate::PageAggregate;
use visitstats_core::event::VisitorEvent;
use visitstats_core::metrics;

use crate::report::{KeyFailure, RunReport, RunScope};
use crate::snapshot::DaySnapshot;
use crate::{Engine, EngineResult};

/// Compute the page rollups of one day, ordered by path.
pub(crate) fn page_aggregates(snapshot: &DaySnapshot) -> Vec<PageAggregate> {
    let mut by_page: BTreeMap<&str, Vec<&VisitorEvent>> = BTreeMap::new();
    for event in &snapshot.events {
        if let Some(page) = event.page() {
            by_page.entry(page).or_default().push(event);
        }
    }

    by_page
        .into_iter()
        .map(|(page, views)| {
            let visitors: HashSet<&str> = views.iter().map(|e| e.ip_address.as_str()).collect();
            let sessions: HashSet<&str> = views.iter().map(|e| e.session_id.as_str()).collect();
            let bounced = sessions
                .iter()
                .filter(|s| snapshot.is_bounced(s))
                .count();
            PageAggregate {
                page_path: page.to_string(),
                date: snapshot.date,
                total_views: views.len() as i64,
                unique_visitors: visitors.len() as i64,
                total_duration_ms: views
                    .iter()
                    .filter_map(|e| e.duration_ms)
                    .map(|d| d.max(0))
                    .sum(),
                bounce_rate: metrics::bounce_rate(bounced as i64, sessions.len() as i64),
            }
        })
        .collect()
}

impl Engine {
    /// Recompute and upsert every page rollup of `date`.
    ///
    /// A failed upsert is recorded in the report and the remaining pages are
    /// still written.
    pub async fn aggregate_pages(&self, date: NaiveDate) -> EngineResult<RunReport> {
        let snapshot = self.load_day(date).await?;
        Ok(self.write_pages(&snapshot).await)
    }

    pub(crate) async fn write_pages(&self, snapshot: &DaySnapshot) -> RunReport {
        let mut report = RunReport::new(snapshot.date, RunScope::Pages, snapshot.skipped_malformed);
        for record in page_aggregates(snapshot) {
            match self.aggregates.upsert_page_aggregate(&record).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    let key = record.key();
                    tracing::warn!(key = %key, error = %e, "Failed to write page aggregate");
                    report.failures.push(KeyFailure {
                        key: key.to_string(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        report
    }
}
