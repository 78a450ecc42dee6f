use chrono::NaiveDate;

use visitstats_core::aggregate::DimensionType;

use crate::report::DayReport;
use crate::{Engine, EngineResult};

impl Engine {
    /// Run every raw-event rollup of `date` from a single read of the day.
    ///
    /// Page and visitor rollups write disjoint keys and run concurrently.
    /// The date enters the run ledger only when every part wrote every key;
    /// until then its raw events are protected from pruning.
    pub async fn aggregate_day(&self, date: NaiveDate) -> EngineResult<DayReport> {
        let snapshot = self.load_day(date).await?;

        let (pages, daily, hourly, country, city) = tokio::join!(
            self.write_pages(&snapshot),
            self.write_daily(&snapshot),
            self.write_dimension(&snapshot, DimensionType::Hourly),
            self.write_dimension(&snapshot, DimensionType::Country),
            self.write_dimension(&snapshot, DimensionType::City),
        );

        let mut report = DayReport {
            date,
            pages,
            daily: daily?,
            hourly: hourly?,
            country: country?,
            city: city?,
            committed: false,
        };

        if report.is_complete() {
            self.aggregates.mark_day_aggregated(date).await?;
            report.committed = true;
            tracing::info!(
                date = %date,
                events = snapshot.events.len(),
                skipped = snapshot.skipped_malformed,
                pages = report.pages.written,
                "Aggregated day"
            );
        } else {
            tracing::warn!(
                date = %date,
                failures = report.failures().count(),
                "Day aggregated with failures; not recorded in run ledger"
            );
        }
        Ok(report)
    }
}
