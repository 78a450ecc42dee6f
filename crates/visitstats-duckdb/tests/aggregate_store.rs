use chrono::NaiveDate;

use visitstats_core::aggregate::{
    DimensionType, PageAggregate, PageKey, VisitorAggregate, VisitorKey,
};
use visitstats_core::store::{AggregateStore, PrunedAggregates};
use visitstats_duckdb::DuckDbBackend;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

fn page(path: &str, date: NaiveDate, views: i64) -> PageAggregate {
    PageAggregate {
        page_path: path.to_string(),
        date,
        total_views: views,
        unique_visitors: views,
        total_duration_ms: 0,
        bounce_rate: 50.0,
    }
}

fn country(date: NaiveDate, code: &str, visitors: i64) -> VisitorAggregate {
    let key = VisitorKey::new(date, DimensionType::Country, Some(code.to_string())).expect("key");
    VisitorAggregate {
        total_visitors: visitors,
        unique_visitors: visitors,
        total_page_views: visitors * 2,
        ..VisitorAggregate::empty(key)
    }
}

#[tokio::test]
async fn page_upsert_overwrites_the_whole_record() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let key = PageKey::new("/pricing", day(2024, 1, 1));
    assert_eq!(db.find_page_aggregate(&key).await.expect("find"), None);

    db.upsert_page_aggregate(&page("/pricing", day(2024, 1, 1), 10))
        .await
        .expect("upsert");
    let mut updated = page("/pricing", day(2024, 1, 1), 3);
    updated.bounce_rate = 33.33;
    updated.total_duration_ms = 9_000;
    db.upsert_page_aggregate(&updated).await.expect("upsert");

    assert_eq!(db.find_page_aggregate(&key).await.expect("find"), Some(updated));
    let rows = db
        .page_aggregates_in_range(day(2024, 1, 1), day(2024, 1, 31))
        .await
        .expect("range");
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn time_bucket_rows_round_trip_without_a_value() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let record = VisitorAggregate {
        total_visitors: 7,
        unique_visitors: 5,
        total_page_views: 12,
        average_session_duration_ms: 42_000,
        bounce_rate: 28.57,
        new_visitors: 4,
        returning_visitors: 1,
        ..VisitorAggregate::empty(VisitorKey::daily(day(2024, 1, 1)))
    };
    db.upsert_visitor_aggregate(&record).await.expect("upsert");

    let found = db
        .find_visitor_aggregate(&VisitorKey::daily(day(2024, 1, 1)))
        .await
        .expect("find");
    assert_eq!(found, Some(record));

    let weekly = VisitorKey::time_bucket(day(2024, 1, 1), DimensionType::Weekly).expect("key");
    assert_eq!(db.find_visitor_aggregate(&weekly).await.expect("find"), None);

    let conn = db.conn_for_test().await;
    let stored: String = conn
        .query_row(
            "SELECT dimension_value FROM visitor_aggregates
             WHERE dimension_type = ?1 AND agg_date = CAST(?2 AS DATE)",
            visitstats_duckdb::duckdb::params!["DAILY", "2024-01-01"],
            |row| row.get(0),
        )
        .expect("stored row");
    assert_eq!(stored, "");
}

#[tokio::test]
async fn replace_dimension_drops_values_no_longer_observed() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let date = day(2024, 1, 1);
    db.replace_dimension(
        date,
        DimensionType::Country,
        &[country(date, "DE", 3), country(date, "FR", 1)],
    )
    .await
    .expect("first replace");
    db.replace_dimension(
        date,
        DimensionType::Country,
        &[country(date, "DE", 2), country(date, "US", 4)],
    )
    .await
    .expect("second replace");

    let rows = db
        .visitor_aggregates_in_range(DimensionType::Country, date, date)
        .await
        .expect("range");
    let values: Vec<(Option<&str>, i64)> = rows
        .iter()
        .map(|r| (r.dimension_value.as_deref(), r.total_visitors))
        .collect();
    assert_eq!(values, vec![(Some("DE"), 2), (Some("US"), 4)]);
}

#[tokio::test]
async fn replace_dimension_rejects_foreign_records() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let date = day(2024, 1, 1);
    db.replace_dimension(date, DimensionType::Country, &[country(date, "DE", 3)])
        .await
        .expect("replace");

    let err = db
        .replace_dimension(
            date,
            DimensionType::Country,
            &[country(day(2024, 1, 2), "FR", 1)],
        )
        .await;
    assert!(err.is_err());

    // The failed call left the earlier rows intact.
    let rows = db
        .visitor_aggregates_in_range(DimensionType::Country, date, date)
        .await
        .expect("range");
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn replace_dimension_with_nothing_clears_the_day() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    let date = day(2024, 1, 1);
    db.replace_dimension(date, DimensionType::Country, &[country(date, "DE", 3)])
        .await
        .expect("replace");
    db.replace_dimension(date, DimensionType::Country, &[])
        .await
        .expect("clear");
    assert!(db
        .visitor_aggregates_in_range(DimensionType::Country, date, date)
        .await
        .expect("range")
        .is_empty());
}

#[tokio::test]
async fn delete_older_than_prunes_rollups_and_ledger() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    for d in [day(2023, 1, 1), day(2023, 6, 1), day(2024, 1, 1)] {
        db.upsert_page_aggregate(&page("/", d, 1)).await.expect("page");
        db.upsert_visitor_aggregate(&VisitorAggregate::empty(VisitorKey::daily(d)))
            .await
            .expect("daily");
        db.mark_day_aggregated(d).await.expect("ledger");
    }

    let pruned = db.delete_older_than(day(2023, 12, 31)).await.expect("prune");
    assert_eq!(
        pruned,
        PrunedAggregates {
            page_aggregates: 2,
            visitor_aggregates: 2,
        }
    );
    assert_eq!(
        db.aggregated_days(day(2023, 1, 1), day(2024, 12, 31))
            .await
            .expect("ledger")
            .into_iter()
            .collect::<Vec<_>>(),
        vec![day(2024, 1, 1)]
    );
}

#[tokio::test]
async fn ledger_marks_are_idempotent() {
    let db = DuckDbBackend::open_in_memory().expect("db");
    db.mark_day_aggregated(day(2024, 1, 2)).await.expect("mark");
    db.mark_day_aggregated(day(2024, 1, 2)).await.expect("mark again");
    let days = db
        .aggregated_days(day(2024, 1, 1), day(2024, 1, 3))
        .await
        .expect("ledger");
    assert_eq!(days.len(), 1);
    assert!(days.contains(&day(2024, 1, 2)));
}

#[tokio::test]
async fn hourly_values_round_trip_as_hours() {
    let db: std::sync::Arc<dyn AggregateStore> =
        std::sync::Arc::new(DuckDbBackend::open_in_memory().expect("db"));
    let date = day(2024, 1, 1);
    let rows: Vec<VisitorAggregate> = [9u32, 10, 23]
        .into_iter()
        .map(|h| VisitorAggregate::empty(VisitorKey::hourly(date, h).expect("key")))
        .collect();
    db.replace_dimension(date, DimensionType::Hourly, &rows)
        .await
        .expect("replace");

    let key = VisitorKey::hourly(date, 9).expect("key");
    assert!(db.find_visitor_aggregate(&key).await.expect("find").is_some());
    let stored = db
        .visitor_aggregates_in_range(DimensionType::Hourly, date, date)
        .await
        .expect("range");
    assert_eq!(stored.len(), 3);
}
