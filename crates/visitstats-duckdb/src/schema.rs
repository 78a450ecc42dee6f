/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup (idempotent).
///
/// `memory_limit` is passed at runtime from `Config.duckdb_memory_limit`
/// (env `VISITSTATS_DUCKDB_MEMORY`, default `"1GB"`).
///
/// IMPORTANT:
///   - Always set an explicit memory limit. The DuckDB default (80% of
///     system RAM) is not acceptable for a long-running process.
///   - Aggregate tables carry no secondary indexes. Upserts use
///     `ON CONFLICT .. DO UPDATE` on the primary key only, and DuckDB turns
///     updates of indexed columns into delete+insert pairs that conflict
///     inside one transaction.
///   - Absent dimension values are stored as `''` because primary-key
///     columns cannot be NULL.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- SETTINGS
-- ===========================================
-- Keys stored in this table:
--   'raw_pruned_before' – raw events dated before this day have been deleted
CREATE TABLE IF NOT EXISTS settings (
    key             VARCHAR PRIMARY KEY,
    value           VARCHAR NOT NULL
);

-- ===========================================
-- VISITOR EVENTS (raw, append-only, short retention)
-- ===========================================
CREATE TABLE IF NOT EXISTS visitor_events (
    id              VARCHAR NOT NULL,              -- UUID v4
    ip_address      VARCHAR NOT NULL,
    occurred_at     TIMESTAMP NOT NULL,            -- naive UTC
    page_path       VARCHAR,                       -- NULL marks a malformed event
    session_id      VARCHAR NOT NULL,
    country         VARCHAR,                       -- resolved before ingestion
    city            VARCHAR,
    referrer        VARCHAR,
    device_type     VARCHAR,
    duration_ms     BIGINT                         -- client-reported, nullable
);

-- Primary query pattern: one UTC day at a time
CREATE INDEX IF NOT EXISTS idx_visitor_events_time
    ON visitor_events(occurred_at);
-- Global per-session event counts (bounce classification)
CREATE INDEX IF NOT EXISTS idx_visitor_events_session
    ON visitor_events(session_id);
CREATE INDEX IF NOT EXISTS idx_visitor_events_page
    ON visitor_events(page_path, occurred_at);
CREATE INDEX IF NOT EXISTS idx_visitor_events_ip
    ON visitor_events(ip_address, occurred_at);

-- ===========================================
-- FIRST-SEEN INDEX (maintained at ingestion, outlives raw events)
-- ===========================================
CREATE TABLE IF NOT EXISTS visitor_first_seen (
    ip_address      VARCHAR PRIMARY KEY,
    first_seen_at   TIMESTAMP NOT NULL
);

-- ===========================================
-- PAGE AGGREGATES (one row per page per day)
-- ===========================================
CREATE TABLE IF NOT EXISTS page_aggregates (
    page_path           VARCHAR NOT NULL,
    agg_date            DATE NOT NULL,
    total_views         BIGINT NOT NULL,
    unique_visitors     BIGINT NOT NULL,
    total_duration_ms   BIGINT NOT NULL,
    bounce_rate         DOUBLE NOT NULL,
    PRIMARY KEY (page_path, agg_date)
);

-- ===========================================
-- VISITOR AGGREGATES (time buckets and dimensions)
-- ===========================================
CREATE TABLE IF NOT EXISTS visitor_aggregates (
    agg_date                    DATE NOT NULL,        -- bucket start
    dimension_type              VARCHAR NOT NULL,     -- 'DAILY' | 'WEEKLY' | ... | 'CITY'
    dimension_value             VARCHAR NOT NULL DEFAULT '',
    total_visitors              BIGINT NOT NULL,
    unique_visitors             BIGINT NOT NULL,
    total_page_views            BIGINT NOT NULL,
    average_session_duration_ms BIGINT NOT NULL,
    bounce_rate                 DOUBLE NOT NULL,
    new_visitors                BIGINT NOT NULL,
    returning_visitors          BIGINT NOT NULL,
    PRIMARY KEY (agg_date, dimension_type, dimension_value)
);

-- ===========================================
-- AGGREGATION RUNS (ledger of committed days)
-- ===========================================
-- A row exists once every raw-event rollup of the day committed. Raw events
-- of days without a row are never pruned.
CREATE TABLE IF NOT EXISTS aggregation_runs (
    agg_date        DATE PRIMARY KEY,
    completed_at    TIMESTAMP NOT NULL
);
"#
    )
}
