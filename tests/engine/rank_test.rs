//! Partitioned window ranking.

use std::cmp::Ordering;

use chrono::NaiveDate;
use granary::engine::rank::{canonical_ordering, fefo_ordering, rank_partitions};

fn d(s: &str) -> Option<NaiveDate> {
    Some(s.parse().expect("test date"))
}

struct Lot {
    warehouse: &'static str,
    lot_id: &'static str,
    expiry: Option<NaiveDate>,
}

fn lot(warehouse: &'static str, lot_id: &'static str, expiry: Option<NaiveDate>) -> Lot {
    Lot {
        warehouse,
        lot_id,
        expiry,
    }
}

fn fefo_ranks(lots: &[Lot]) -> Vec<u32> {
    rank_partitions(
        lots,
        |l| l.warehouse.to_string(),
        |a, b| fefo_ordering(a.expiry, a.lot_id, b.expiry, b.lot_id),
    )
}

#[test]
fn test_ranks_are_consecutive_within_each_partition() {
    let lots = vec![
        lot("W1", "L3", d("2024-06-01")),
        lot("W1", "L1", d("2024-01-01")),
        lot("W2", "L9", d("2024-03-01")),
        lot("W1", "L2", d("2024-03-01")),
    ];
    let ranks = fefo_ranks(&lots);
    // W1 partition ranks 1..3, W2 ranks alone.
    assert_eq!(ranks, vec![3, 1, 1, 2]);
}

#[test]
fn test_missing_expiry_ranks_after_every_dated_lot() {
    let lots = vec![
        lot("W1", "L1", None),
        lot("W1", "L2", d("2099-12-31")),
    ];
    let ranks = fefo_ranks(&lots);
    assert_eq!(ranks, vec![2, 1]);
}

#[test]
fn test_expiry_ties_break_by_lot_id() {
    let lots = vec![
        lot("W1", "LB", d("2024-03-01")),
        lot("W1", "LA", d("2024-03-01")),
    ];
    let ranks = fefo_ranks(&lots);
    assert_eq!(ranks, vec![2, 1]);
}

#[test]
fn test_input_order_does_not_change_ranks() {
    let forward = vec![
        lot("W1", "L1", d("2024-02-01")),
        lot("W1", "L2", None),
        lot("W1", "L3", d("2024-01-01")),
    ];
    let reversed = vec![
        lot("W1", "L3", d("2024-01-01")),
        lot("W1", "L2", None),
        lot("W1", "L1", d("2024-02-01")),
    ];

    let forward_ranks = fefo_ranks(&forward);
    let reversed_ranks = fefo_ranks(&reversed);

    // Same lot gets the same rank regardless of row order.
    assert_eq!(forward_ranks, vec![2, 3, 1]);
    assert_eq!(reversed_ranks, vec![1, 3, 2]);
}

#[test]
fn test_canonical_ordering_prefers_latest_date_then_largest_id() {
    let jan = "2024-01-01".parse().unwrap();
    let feb = "2024-02-01".parse().unwrap();
    assert_eq!(canonical_ordering(feb, 1, jan, 9), Ordering::Less);
    assert_eq!(canonical_ordering(jan, 1, jan, 9), Ordering::Greater);
    assert_eq!(canonical_ordering(jan, 5, jan, 5), Ordering::Equal);
}
