//! Coverage flag propagation.

use granary::engine::coverage::{fx_rate_for, Covered, CoverageFlag};

#[test]
fn test_combine_is_partial_if_either_side_is_partial() {
    use CoverageFlag::{Actual, Partial};
    assert_eq!(Actual.combine(Actual), Actual);
    assert_eq!(Actual.combine(Partial), Partial);
    assert_eq!(Partial.combine(Actual), Partial);
    assert_eq!(Partial.combine(Partial), Partial);
}

#[test]
fn test_derived_value_inherits_partial_from_any_upstream() {
    let cost = Covered::partial(7.0);
    let qty = Covered::actual(30.0);

    // The derivation never re-checks raw inputs; the flag rides along.
    let cogs = qty.zip_with(cost, |q, c| q * c);
    assert_eq!(cogs.value, Some(210.0));
    assert_eq!(cogs.flag, CoverageFlag::Partial);

    let margin = Covered::actual(500.0).zip_with(cogs, |rev, c| rev - c);
    assert_eq!(margin.value, Some(290.0));
    assert_eq!(margin.flag, CoverageFlag::Partial);
}

#[test]
fn test_missing_input_is_never_zero_filled() {
    let rate: Covered<f64> = Covered::missing();
    let amount = Covered::actual(100.0);
    let converted = amount.zip_with(rate, |a, r| a * r);
    // No value, not a value of zero.
    assert_eq!(converted.value, None);
    assert_eq!(converted.flag, CoverageFlag::Partial);
}

#[test]
fn test_map_preserves_flag_without_consuming_new_inputs() {
    let v = Covered::actual(3.0).map(|x| x * 2.0);
    assert_eq!(v.value, Some(6.0));
    assert!(v.is_actual());

    let p = Covered::partial(3.0).map(|x| x * 2.0);
    assert_eq!(p.flag, CoverageFlag::Partial);
}

#[test]
fn test_from_option_classifies_presence() {
    assert!(Covered::from_option(Some(1.0)).is_actual());
    let missing: Covered<f64> = Covered::from_option(None);
    assert_eq!(missing.flag, CoverageFlag::Partial);
    assert_eq!(missing.value, None);
}

#[test]
fn test_base_currency_rows_convert_at_one_without_a_rate() {
    let rate = fx_rate_for("KRW", "KRW", None);
    assert_eq!(rate.value, Some(1.0));
    assert!(rate.is_actual());
}

#[test]
fn test_non_base_currency_without_rate_is_missing() {
    let rate = fx_rate_for("USD", "KRW", None);
    assert_eq!(rate.value, None);
    assert_eq!(rate.flag, CoverageFlag::Partial);

    let supplied = fx_rate_for("USD", "KRW", Some(1350.0));
    assert_eq!(supplied.value, Some(1350.0));
    assert!(supplied.is_actual());
}
