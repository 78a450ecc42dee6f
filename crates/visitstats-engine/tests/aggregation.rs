use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use visitstats_core::aggregate::{DimensionType, PageKey, VisitorKey};
use visitstats_core::event::VisitorEvent;
use visitstats_duckdb::DuckDbBackend;
use visitstats_engine::report::RunScope;
use visitstats_engine::{Engine, EngineError};

fn ts(d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, min, 0)
        .single()
        .expect("timestamp")
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).expect("date")
}

fn setup() -> (Arc<DuckDbBackend>, Engine) {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("db"));
    let engine = Engine::with_backend(db.clone());
    (db, engine)
}

fn located(
    ip: &str,
    session: &str,
    page: &str,
    at: DateTime<Utc>,
    country: &str,
    city: &str,
) -> VisitorEvent {
    let mut event = VisitorEvent::page_view(ip, session, page, at);
    event.country = Some(country.to_string());
    event.city = Some(city.to_string());
    event
}

/// `{1.1.1.1 /, 1.1.1.1 /about, 2.2.2.2 /}` on 2024-01-01.
async fn seed_scenario(db: &DuckDbBackend) {
    db.insert_events(&[
        located("1.1.1.1", "s1", "/", ts(1, 10, 0), "DE", "Berlin"),
        located("1.1.1.1", "s1", "/about", ts(1, 10, 5), "DE", "Berlin"),
        located("2.2.2.2", "s2", "/", ts(1, 14, 30), "FR", "Paris"),
    ])
    .await
    .expect("insert");
}

#[tokio::test]
async fn end_to_end_scenario() {
    let (db, engine) = setup();
    seed_scenario(&db).await;

    let report = engine.aggregate_day(day(1)).await.expect("aggregate");
    assert!(report.committed);
    assert_eq!(report.pages.written, 2);
    assert_eq!(report.hourly.written, 2);
    assert_eq!(report.country.written, 2);

    let daily = db
        .find_visitor_aggregate(&VisitorKey::daily(day(1)))
        .await
        .expect("find")
        .expect("daily row");
    assert_eq!(daily.total_visitors, 3);
    assert_eq!(daily.unique_visitors, 2);
    assert_eq!(daily.total_page_views, 3);
    assert_eq!(daily.bounce_rate, 50.0);
    assert_eq!(daily.new_visitors, 2);
    assert_eq!(daily.returning_visitors, 0);
    // s1 lasts five minutes, s2 is a single view.
    assert_eq!(daily.average_session_duration_ms, 150_000);

    let root = db
        .find_page_aggregate(&PageKey::new("/", day(1)))
        .await
        .expect("find")
        .expect("page row");
    assert_eq!((root.total_views, root.unique_visitors), (2, 2));
    assert_eq!(root.bounce_rate, 50.0);

    let about = db
        .find_page_aggregate(&PageKey::new("/about", day(1)))
        .await
        .expect("find")
        .expect("page row");
    assert_eq!((about.total_views, about.unique_visitors), (1, 1));
    assert_eq!(about.bounce_rate, 0.0);

    let ledger = db.aggregated_days(day(1), day(1)).await.expect("ledger");
    assert!(ledger.contains(&day(1)));
}

#[tokio::test]
async fn aggregating_twice_yields_identical_rows() {
    let (db, engine) = setup();
    seed_scenario(&db).await;

    engine.aggregate_day(day(1)).await.expect("first run");
    let pages_before = db.page_aggregates_in_range(day(1), day(1)).await.expect("pages");
    let mut visitors_before = Vec::new();
    for dim in DimensionType::ALL {
        visitors_before.extend(
            db.visitor_aggregates_in_range(dim, day(1), day(1))
                .await
                .expect("rows"),
        );
    }

    engine.aggregate_day(day(1)).await.expect("second run");
    engine.aggregate_daily(day(1)).await.expect("daily again");
    let pages_after = db.page_aggregates_in_range(day(1), day(1)).await.expect("pages");
    let mut visitors_after = Vec::new();
    for dim in DimensionType::ALL {
        visitors_after.extend(
            db.visitor_aggregates_in_range(dim, day(1), day(1))
                .await
                .expect("rows"),
        );
    }

    assert_eq!(pages_before, pages_after);
    assert_eq!(visitors_before, visitors_after);
}

#[tokio::test]
async fn bounce_uses_global_session_counts() {
    let (db, engine) = setup();
    db.insert_events(&[
        // Crosses midnight: one event on each day, two in total.
        VisitorEvent::page_view("1.1.1.1", "late", "/", ts(1, 23, 59)),
        VisitorEvent::page_view("1.1.1.1", "late", "/next", ts(2, 0, 1)),
        VisitorEvent::page_view("2.2.2.2", "solo", "/", ts(2, 9, 0)),
    ])
    .await
    .expect("insert");

    engine.aggregate_daily(day(1)).await.expect("day 1");
    engine.aggregate_daily(day(2)).await.expect("day 2");

    let jan1 = db
        .find_visitor_aggregate(&VisitorKey::daily(day(1)))
        .await
        .expect("find")
        .expect("row");
    assert_eq!(jan1.bounce_rate, 0.0);

    let jan2 = db
        .find_visitor_aggregate(&VisitorKey::daily(day(2)))
        .await
        .expect("find")
        .expect("row");
    assert_eq!(jan2.bounce_rate, 50.0);
}

#[tokio::test]
async fn malformed_rows_do_not_rescue_a_bounce() {
    let (db, engine) = setup();
    let mut broken = VisitorEvent::page_view("1.1.1.1", "one", "/", ts(1, 10, 1));
    broken.page_path = None;
    db.insert_events(&[
        VisitorEvent::page_view("1.1.1.1", "one", "/", ts(1, 10, 0)),
        broken,
    ])
    .await
    .expect("insert");

    engine.aggregate_daily(day(1)).await.expect("daily");
    let row = db
        .find_visitor_aggregate(&VisitorKey::daily(day(1)))
        .await
        .expect("find")
        .expect("row");
    assert_eq!(row.total_visitors, 1);
    assert_eq!(row.bounce_rate, 100.0);
}

#[tokio::test]
async fn visitors_seen_earlier_are_returning() {
    let (db, engine) = setup();
    db.insert_events(&[
        VisitorEvent::page_view("1.1.1.1", "old", "/", ts(1, 8, 0)),
        VisitorEvent::page_view("1.1.1.1", "again", "/", ts(3, 8, 0)),
        VisitorEvent::page_view("2.2.2.2", "first", "/", ts(3, 9, 0)),
    ])
    .await
    .expect("insert");

    engine.aggregate_daily(day(3)).await.expect("aggregate");
    let row = db
        .find_visitor_aggregate(&VisitorKey::daily(day(3)))
        .await
        .expect("find")
        .expect("row");
    assert_eq!(row.new_visitors, 1);
    assert_eq!(row.returning_visitors, 1);
}

#[tokio::test]
async fn quiet_day_resets_daily_row_to_zero() {
    let (db, engine) = setup();
    let report = engine.aggregate_day(day(5)).await.expect("aggregate");
    assert!(report.committed);
    assert_eq!(report.pages.written, 0);

    let row = db
        .find_visitor_aggregate(&VisitorKey::daily(day(5)))
        .await
        .expect("find")
        .expect("zero row");
    assert_eq!(row.total_visitors, 0);
    assert_eq!(row.bounce_rate, 0.0);
    assert_eq!(row.average_session_duration_ms, 0);
}

#[tokio::test]
async fn malformed_events_are_skipped_and_counted() {
    let (db, engine) = setup();
    let mut no_page = VisitorEvent::page_view("1.1.1.1", "s1", "/", ts(1, 10, 0));
    no_page.page_path = None;
    let blank_ip = VisitorEvent::page_view("  ", "s2", "/", ts(1, 10, 0));
    db.insert_events(&[
        no_page,
        blank_ip,
        VisitorEvent::page_view("3.3.3.3", "s3", "/", ts(1, 11, 0)),
    ])
    .await
    .expect("insert");

    let report = engine.aggregate_pages(day(1)).await.expect("pages");
    assert_eq!(report.scope, RunScope::Pages);
    assert_eq!(report.skipped_malformed, 2);
    assert_eq!(report.written, 1);

    let daily = engine.aggregate_daily(day(1)).await.expect("daily");
    assert_eq!(daily.skipped_malformed, 2);
    let row = db
        .find_visitor_aggregate(&VisitorKey::daily(day(1)))
        .await
        .expect("find")
        .expect("row");
    assert_eq!(row.total_visitors, 1);
}

#[tokio::test]
async fn dimensions_only_hold_observed_values() {
    let (db, engine) = setup();
    seed_scenario(&db).await;
    // No geo data: counted in DAILY and HOURLY, absent from COUNTRY/CITY.
    db.insert_events(&[VisitorEvent::page_view("4.4.4.4", "s4", "/", ts(1, 14, 45))])
        .await
        .expect("insert");

    engine.aggregate_hourly(day(1)).await.expect("hourly");
    engine.aggregate_by_country(day(1)).await.expect("country");
    engine.aggregate_by_city(day(1)).await.expect("city");

    let hours = db
        .visitor_aggregates_in_range(DimensionType::Hourly, day(1), day(1))
        .await
        .expect("hours");
    let mut observed: Vec<(String, i64)> = hours
        .iter()
        .map(|r| (r.dimension_value.clone().unwrap_or_default(), r.total_visitors))
        .collect();
    observed.sort();
    assert_eq!(observed, vec![("10".to_string(), 2), ("14".to_string(), 2)]);

    let countries = db
        .visitor_aggregates_in_range(DimensionType::Country, day(1), day(1))
        .await
        .expect("countries");
    let total: i64 = countries.iter().map(|r| r.total_visitors).sum();
    assert_eq!(countries.len(), 2);
    assert_eq!(total, 3);

    let berlin = db
        .find_visitor_aggregate(
            &VisitorKey::new(day(1), DimensionType::City, Some("Berlin".to_string())).expect("key"),
        )
        .await
        .expect("find")
        .expect("row");
    assert_eq!(berlin.total_visitors, 2);
    assert_eq!(berlin.unique_visitors, 1);
}

#[tokio::test]
async fn page_durations_sum_reported_values() {
    let (db, engine) = setup();
    let mut first = VisitorEvent::page_view("1.1.1.1", "s1", "/docs", ts(1, 10, 0));
    first.duration_ms = Some(4_000);
    let mut second = VisitorEvent::page_view("2.2.2.2", "s2", "/docs", ts(1, 11, 0));
    second.duration_ms = Some(6_500);
    let unreported = VisitorEvent::page_view("3.3.3.3", "s3", "/docs", ts(1, 12, 0));
    db.insert_events(&[first, second, unreported])
        .await
        .expect("insert");

    engine.aggregate_pages(day(1)).await.expect("pages");
    let row = db
        .find_page_aggregate(&PageKey::new("/docs", day(1)))
        .await
        .expect("find")
        .expect("row");
    assert_eq!(row.total_duration_ms, 10_500);
    assert_eq!(row.bounce_rate, 100.0);
}

#[tokio::test]
async fn weekly_rollup_requires_every_day() {
    let (db, engine) = setup();
    seed_scenario(&db).await;
    // 2024-01-01 is a Monday.
    for d in 1..=6 {
        engine.aggregate_daily(day(d)).await.expect("daily");
    }

    match engine.aggregate_weekly(day(3)).await {
        Err(EngineError::IncompleteCoverage {
            dimension,
            period_start,
            missing,
        }) => {
            assert_eq!(dimension, DimensionType::Weekly);
            assert_eq!(period_start, day(1));
            assert_eq!(missing, vec![day(7)]);
        }
        other => panic!("expected incomplete coverage, got {other:?}"),
    }

    engine.aggregate_daily(day(7)).await.expect("daily");
    let week = engine.aggregate_weekly(day(3)).await.expect("weekly");
    assert_eq!(week.date, day(1));
    assert_eq!(week.total_visitors, 3);

    let stored = db
        .find_visitor_aggregate(
            &VisitorKey::time_bucket(day(1), DimensionType::Weekly).expect("key"),
        )
        .await
        .expect("find");
    assert_eq!(stored, Some(week));
}

#[tokio::test]
async fn monthly_and_yearly_rollups_chain() {
    let (db, engine) = setup();
    seed_scenario(&db).await;
    for d in 1..=31 {
        engine.aggregate_daily(day(d)).await.expect("daily");
    }
    let month = engine.aggregate_monthly(day(17)).await.expect("monthly");
    assert_eq!(month.date, day(1));
    assert_eq!(month.total_visitors, 3);
    assert_eq!(month.unique_visitors, 2);

    assert!(matches!(
        engine.aggregate_yearly(2024).await,
        Err(EngineError::IncompleteCoverage { missing, .. }) if missing.len() == 11
    ));
    assert!(matches!(
        engine.aggregate_yearly(i32::MAX).await,
        Err(EngineError::InvalidYear(_))
    ));
}
