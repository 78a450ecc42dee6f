//! Retention: raw events age out on a short horizon, rollups on a long one.

use chrono::NaiveDate;

use visitstats_core::config::RetentionPolicy;
use visitstats_core::store::PrunedAggregates;

use crate::report::{RawPruneOutcome, RetentionReport};
use crate::{Engine, EngineResult};

impl Engine {
    /// Delete raw events dated before `older_than`.
    ///
    /// The cutoff is lowered to the first date that still has raw events but
    /// no committed aggregation, so unaggregated days are never lost.
    pub async fn prune_raw_events(&self, older_than: NaiveDate) -> EngineResult<RawPruneOutcome> {
        let candidates = self.events.event_dates_before(older_than).await?;
        let blocked_dates: Vec<NaiveDate> = match (candidates.first(), candidates.last()) {
            (Some(first), Some(last)) => {
                let committed = self.aggregates.aggregated_days(*first, *last).await?;
                candidates
                    .iter()
                    .filter(|d| !committed.contains(*d))
                    .copied()
                    .collect()
            }
            _ => Vec::new(),
        };
        let effective_cutoff = blocked_dates
            .first()
            .map_or(older_than, |first| (*first).min(older_than));

        if !blocked_dates.is_empty() {
            tracing::warn!(
                requested = %older_than,
                effective = %effective_cutoff,
                blocked = blocked_dates.len(),
                "Holding back raw events of days that were never aggregated"
            );
        }

        let deleted = self.events.delete_events_before(effective_cutoff).await?;
        Ok(RawPruneOutcome {
            deleted,
            requested_cutoff: older_than,
            effective_cutoff,
            blocked_dates,
        })
    }

    pub async fn prune_aggregates(&self, older_than: NaiveDate) -> EngineResult<PrunedAggregates> {
        Ok(self.aggregates.delete_older_than(older_than).await?)
    }

    /// Run both prune steps for `today`. A failing step is reported and does
    /// not prevent the other from running.
    pub async fn run_retention(&self, today: NaiveDate, policy: RetentionPolicy) -> RetentionReport {
        let raw_cutoff = policy.raw_cutoff(today);
        let aggregate_cutoff = policy.aggregate_cutoff(today);

        let raw = self.prune_raw_events(raw_cutoff).await.map_err(|e| {
            tracing::error!(cutoff = %raw_cutoff, error = %e, "Raw event pruning failed");
            e.to_string()
        });
        let aggregates = self.prune_aggregates(aggregate_cutoff).await.map_err(|e| {
            tracing::error!(cutoff = %aggregate_cutoff, error = %e, "Aggregate pruning failed");
            e.to_string()
        });

        RetentionReport {
            today,
            raw_cutoff,
            aggregate_cutoff,
            raw,
            aggregates,
        }
    }
}
