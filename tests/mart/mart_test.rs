//! Mart materialization: idempotence and partition-scoped rewrites.

use granary::engine::coverage::CoverageFlag;
use granary::facts::PartitionKey;
use granary::mart::{MartDb, MartError, MartRow};

fn dims() -> Vec<String> {
    vec!["item".to_string(), "warehouse".to_string()]
}

fn metrics() -> Vec<String> {
    vec!["days_on_hand".to_string()]
}

fn row(item: &str, warehouse: &str, value: Option<f64>, flag: CoverageFlag) -> MartRow {
    MartRow {
        key: PartitionKey::new([item, warehouse]),
        values: vec![("days_on_hand".to_string(), value, flag)],
    }
}

fn count(db: &MartDb, table: &str) -> i64 {
    db.conn()
        .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |r| {
            r.get(0)
        })
        .unwrap()
}

#[test]
fn test_rerunning_the_same_partitions_is_idempotent() {
    let mut db = MartDb::open_in_memory().unwrap();
    let rows = vec![
        row("SKU1", "W1", Some(10.0), CoverageFlag::Actual),
        row("SKU2", "W1", Some(999.0), CoverageFlag::Actual),
    ];

    db.begin_run();
    db.materialize("mart_health", &dims(), &metrics(), &rows)
        .unwrap();
    db.begin_run();
    db.materialize("mart_health", &dims(), &metrics(), &rows)
        .unwrap();

    assert_eq!(count(&db, "mart_health"), 2);
}

#[test]
fn test_rewrite_replaces_only_the_partitions_present() {
    let mut db = MartDb::open_in_memory().unwrap();
    db.begin_run();
    db.materialize(
        "mart_health",
        &dims(),
        &metrics(),
        &[
            row("SKU1", "W1", Some(10.0), CoverageFlag::Actual),
            row("SKU2", "W1", Some(20.0), CoverageFlag::Actual),
        ],
    )
    .unwrap();

    // Second run only recomputes SKU1.
    db.begin_run();
    db.materialize(
        "mart_health",
        &dims(),
        &metrics(),
        &[row("SKU1", "W1", Some(11.0), CoverageFlag::Actual)],
    )
    .unwrap();

    assert_eq!(count(&db, "mart_health"), 2);
    let sku1: f64 = db
        .conn()
        .query_row(
            "SELECT days_on_hand FROM mart_health WHERE item = 'SKU1'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    let sku2: f64 = db
        .conn()
        .query_row(
            "SELECT days_on_hand FROM mart_health WHERE item = 'SKU2'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(sku1, 11.0);
    assert_eq!(sku2, 20.0);
}

#[test]
fn test_null_values_carry_a_partial_flag() {
    let mut db = MartDb::open_in_memory().unwrap();
    db.begin_run();
    db.materialize(
        "mart_health",
        &dims(),
        &metrics(),
        &[row("SKU1", "W1", None, CoverageFlag::Partial)],
    )
    .unwrap();

    let (value, flag): (Option<f64>, String) = db
        .conn()
        .query_row(
            "SELECT days_on_hand, days_on_hand_flag FROM mart_health",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(value, None);
    assert_eq!(flag, "PARTIAL");
}

#[test]
fn test_writing_the_same_key_twice_in_one_run_is_a_conflict() {
    let mut db = MartDb::open_in_memory().unwrap();
    db.begin_run();
    db.materialize(
        "mart_health",
        &dims(),
        &metrics(),
        &[row("SKU1", "W1", Some(1.0), CoverageFlag::Actual)],
    )
    .unwrap();

    let err = db
        .materialize(
            "mart_health",
            &dims(),
            &metrics(),
            &[row("SKU1", "W1", Some(2.0), CoverageFlag::Actual)],
        )
        .unwrap_err();
    assert!(matches!(err, MartError::WriteConflict { .. }));

    // The conflicting write never landed; the first value survives.
    let value: f64 = db
        .conn()
        .query_row("SELECT days_on_hand FROM mart_health", [], |r| r.get(0))
        .unwrap();
    assert_eq!(value, 1.0);
}

#[test]
fn test_key_arity_must_match_table_dimensions() {
    let mut db = MartDb::open_in_memory().unwrap();
    db.begin_run();
    let bad = MartRow {
        key: PartitionKey::new(["SKU1"]),
        values: vec![("days_on_hand".to_string(), Some(1.0), CoverageFlag::Actual)],
    };
    let err = db
        .materialize("mart_health", &dims(), &metrics(), &[bad])
        .unwrap_err();
    assert!(matches!(err, MartError::KeyArity { .. }));
}

#[test]
fn test_rollup_rows_are_keyed_by_group_and_metric() {
    use granary::engine::aggregate::DualSum;

    let mut db = MartDb::open_in_memory().unwrap();
    db.begin_run();
    let groups = vec![(
        PartitionKey::new(["2024-01"]),
        DualSum {
            known_sum: 100.0,
            total_sum_min: 115.0,
            partial_rows: 1,
        },
    )];
    db.materialize_rollup(
        "mart_pnl_revenue",
        &["period".to_string()],
        "net_revenue",
        &groups,
    )
    .unwrap();

    let (known, total, partial): (f64, f64, i64) = db
        .conn()
        .query_row(
            "SELECT known_sum, total_sum_min, partial_rows
             FROM mart_pnl_revenue_rollup
             WHERE period = '2024-01' AND metric = 'net_revenue'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!(known, 100.0);
    assert_eq!(total, 115.0);
    assert_eq!(partial, 1);
}
