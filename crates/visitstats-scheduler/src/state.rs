use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;

use visitstats_core::config::Config;
use visitstats_duckdb::DuckDbBackend;
use visitstats_engine::Engine;

/// Shared state of the scheduler process.
///
/// The engine and the backend point at the same DuckDB connection; the
/// backend is kept separately for ledger and record lookups.
pub struct AppState {
    pub db: Arc<DuckDbBackend>,
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
    /// Day the retention run last completed, so it runs once per day.
    last_retention_run: Mutex<Option<NaiveDate>>,
}

impl AppState {
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let db = Arc::new(db);
        Self {
            engine: Arc::new(Engine::with_backend(db.clone())),
            db,
            config: Arc::new(config),
            last_retention_run: Mutex::new(None),
        }
    }

    pub async fn last_retention_run(&self) -> Option<NaiveDate> {
        *self.last_retention_run.lock().await
    }

    /// Record `today` as the retention day. Returns `false` if retention
    /// already ran today.
    pub(crate) async fn claim_retention_run(&self, today: NaiveDate) -> bool {
        let mut last = self.last_retention_run.lock().await;
        if *last == Some(today) {
            return false;
        }
        *last = Some(today);
        true
    }
}
