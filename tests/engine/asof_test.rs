//! As-of resolution over the cost timeline.

use chrono::NaiveDate;
use granary::engine::asof::{AsOf, CostTimeline};
use granary::facts::{CostComponent, CostComponentKind};

fn d(s: &str) -> NaiveDate {
    s.parse().expect("test date")
}

fn component(
    item: &str,
    effective_date: &str,
    kind: CostComponentKind,
    cost: f64,
    record_id: u64,
) -> CostComponent {
    CostComponent {
        item: item.to_string(),
        effective_date: d(effective_date),
        component_kind: kind,
        cost_per_unit: cost,
        record_id,
    }
}

#[test]
fn test_resolve_uses_greatest_effective_date_at_or_before_target() {
    let timeline = CostTimeline::from_components(&[
        component("SKU1", "2024-01-01", CostComponentKind::Inbound, 5.0, 1),
        component("SKU1", "2024-02-01", CostComponentKind::Inbound, 6.0, 2),
    ]);

    // A target between the two effective dates resolves to the earlier one.
    let cost = timeline.resolve("SKU1", d("2024-01-15")).unwrap();
    assert_eq!(cost.unit_cost, 5.0);

    // The boundary date itself is inclusive.
    let cost = timeline.resolve("SKU1", d("2024-02-01")).unwrap();
    assert_eq!(cost.unit_cost, 6.0);
}

#[test]
fn test_no_record_effective_yet_resolves_to_none() {
    let timeline = CostTimeline::from_components(&[component(
        "SKU1",
        "2024-03-01",
        CostComponentKind::Inbound,
        5.0,
        1,
    )]);
    assert!(timeline.resolve("SKU1", d("2024-02-28")).is_none());
    assert!(timeline.resolve("OTHER", d("2024-03-02")).is_none());
}

#[test]
fn test_components_are_summed_per_item_and_date_before_resolution() {
    let timeline = CostTimeline::from_components(&[
        component("SKU1", "2024-01-01", CostComponentKind::Inbound, 5.0, 1),
        component("SKU1", "2024-01-01", CostComponentKind::Storage, 1.5, 2),
        component("SKU1", "2024-01-01", CostComponentKind::Customs, 0.5, 3),
    ]);

    let cost = timeline.resolve("SKU1", d("2024-01-10")).unwrap();
    assert_eq!(cost.unit_cost, 7.0);
    assert_eq!(cost.kinds_present.len(), 3);
    // Outbound and Return never arrived, so the set is incomplete.
    assert!(!cost.complete());
}

#[test]
fn test_all_component_kinds_present_is_complete() {
    let components: Vec<CostComponent> = CostComponentKind::ALL
        .iter()
        .enumerate()
        .map(|(i, &kind)| component("SKU1", "2024-01-01", kind, 1.0, i as u64 + 1))
        .collect();
    let timeline = CostTimeline::from_components(&components);

    let cost = timeline.resolve("SKU1", d("2024-01-01")).unwrap();
    assert!(cost.complete());
    assert_eq!(cost.unit_cost, CostComponentKind::ALL.len() as f64);
}

#[test]
fn test_duplicate_component_rows_keep_largest_record_id() {
    let timeline = CostTimeline::from_components(&[
        component("SKU1", "2024-01-01", CostComponentKind::Inbound, 9.0, 10),
        component("SKU1", "2024-01-01", CostComponentKind::Inbound, 4.0, 3),
    ]);

    let cost = timeline.resolve("SKU1", d("2024-01-01")).unwrap();
    assert_eq!(cost.unit_cost, 9.0);
}

#[test]
fn test_default_timeline_is_empty_without_default_values() {
    // Default must not demand a Default value type (ResolvedCost has none).
    let timeline = CostTimeline::default();
    assert!(timeline.resolve("SKU1", d("2024-01-01")).is_none());

    let asof: AsOf<&str> = AsOf::default();
    assert!(asof.resolve("K", d("2024-01-01")).is_none());
}

#[test]
fn test_generic_asof_ties_break_by_larger_insertion_id() {
    let mut asof = AsOf::new();
    asof.insert("K", d("2024-05-01"), 2, "later");
    asof.insert("K", d("2024-05-01"), 1, "earlier");
    // Insertion order must not matter.
    assert_eq!(asof.resolve("K", d("2024-05-02")), Some(&"later"));

    let mut reversed = AsOf::new();
    reversed.insert("K", d("2024-05-01"), 1, "earlier");
    reversed.insert("K", d("2024-05-01"), 2, "later");
    assert_eq!(reversed.resolve("K", d("2024-05-02")), Some(&"later"));
}
