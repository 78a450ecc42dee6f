use std::time::Duration;

use chrono::NaiveDate;

/// Upper bound for either retention horizon, about a century.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    pub raw_retention_days: u32,
    pub aggregate_retention_days: u32,
    pub scheduler_tick_seconds: u64,
    /// UTC hour after which the previous day is considered closed.
    pub daily_run_hour: u32,
}

/// The two independent retention horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub raw_days: u32,
    pub aggregate_days: u32,
}

impl RetentionPolicy {
    /// Raw events dated before this day are eligible for pruning.
    pub fn raw_cutoff(&self, today: NaiveDate) -> NaiveDate {
        days_before(today, self.raw_days)
    }

    /// Aggregates dated before this day are eligible for pruning.
    pub fn aggregate_cutoff(&self, today: NaiveDate) -> NaiveDate {
        days_before(today, self.aggregate_days)
    }
}

/// Saturates at the earliest representable date.
fn days_before(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_signed(chrono::Duration::days(i64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            raw_days: 30,
            aggregate_days: 730,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let cfg = Self {
            data_dir: std::env::var("VISITSTATS_DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("VISITSTATS_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            raw_retention_days: std::env::var("VISITSTATS_RAW_RETENTION_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|e| format!("invalid VISITSTATS_RAW_RETENTION_DAYS: {e}"))?,
            aggregate_retention_days: std::env::var("VISITSTATS_AGGREGATE_RETENTION_DAYS")
                .unwrap_or_else(|_| "730".to_string())
                .parse()
                .map_err(|e| format!("invalid VISITSTATS_AGGREGATE_RETENTION_DAYS: {e}"))?,
            scheduler_tick_seconds: std::env::var("VISITSTATS_SCHEDULER_TICK_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|v| v.clamp(10, 3600))
                .unwrap_or(60),
            daily_run_hour: std::env::var("VISITSTATS_DAILY_RUN_HOUR")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|h| *h < 24)
                .unwrap_or(1),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.raw_retention_days == 0 {
            return Err("VISITSTATS_RAW_RETENTION_DAYS must be at least 1".to_string());
        }
        if self.aggregate_retention_days > MAX_RETENTION_DAYS {
            return Err(format!(
                "VISITSTATS_AGGREGATE_RETENTION_DAYS must be at most {MAX_RETENTION_DAYS}"
            ));
        }
        if self.aggregate_retention_days < self.raw_retention_days {
            return Err(format!(
                "aggregate retention ({} days) must not be shorter than raw retention ({} days)",
                self.aggregate_retention_days, self.raw_retention_days
            ));
        }
        Ok(())
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            raw_days: self.raw_retention_days,
            aggregate_days: self.aggregate_retention_days,
        }
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_seconds)
    }

    pub fn db_path(&self) -> String {
        format!("{}/visitstats.db", self.data_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            duckdb_memory_limit: "1GB".to_string(),
            raw_retention_days: 30,
            aggregate_retention_days: 730,
            scheduler_tick_seconds: 60,
            daily_run_hour: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_horizon_must_cover_raw_horizon() {
        let cfg = Config {
            raw_retention_days: 90,
            aggregate_retention_days: 30,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn retention_horizons_are_capped() {
        let cfg = Config {
            raw_retention_days: 30,
            aggregate_retention_days: MAX_RETENTION_DAYS + 1,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            raw_retention_days: MAX_RETENTION_DAYS,
            aggregate_retention_days: MAX_RETENTION_DAYS,
            ..Config::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn huge_horizons_saturate_instead_of_panicking() {
        let policy = RetentionPolicy {
            raw_days: u32::MAX,
            aggregate_days: u32::MAX,
        };
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).expect("date");
        assert_eq!(policy.raw_cutoff(today), NaiveDate::MIN);
        assert_eq!(policy.aggregate_cutoff(today), NaiveDate::MIN);
    }

    #[test]
    fn cutoffs_count_back_from_today() {
        let policy = RetentionPolicy::default();
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).expect("date");
        assert_eq!(
            policy.raw_cutoff(today),
            NaiveDate::from_ymd_opt(2024, 3, 1).expect("date")
        );
        assert_eq!(
            policy.aggregate_cutoff(today),
            NaiveDate::from_ymd_opt(2022, 4, 1).expect("date")
        );
    }
}
