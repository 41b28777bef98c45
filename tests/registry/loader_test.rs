//! Registry TOML loading.

use granary::registry::loader::{from_toml_str, LoaderError};
use granary::registry::ExceptionPolicy;

#[test]
fn test_empty_file_selects_the_full_builtin_catalog() {
    let registry = from_toml_str("").unwrap();
    assert_eq!(registry.specs().len(), 20);
    assert_eq!(registry.base_currency(), "KRW");
}

#[test]
fn test_base_currency_override() {
    let registry = from_toml_str(r#"base_currency = "USD""#).unwrap();
    assert_eq!(registry.base_currency(), "USD");
}

#[test]
fn test_metric_entries_select_a_subset() {
    let text = r#"
        [[metric]]
        name = "on_hand_qty"
        formula = "on_hand_qty"

        [[metric]]
        name = "expired_qty"
        formula = "expired_qty"
    "#;
    let registry = from_toml_str(text).unwrap();
    assert_eq!(registry.specs().len(), 2);
    assert!(registry.get("on_hand_qty").is_some());
    assert!(registry.get("fefo_rank").is_none());
}

#[test]
fn test_omitted_fields_default_from_the_builtin_entry() {
    let text = r#"
        [[metric]]
        name = "sellable_qty"
        formula = "sellable_qty"

        [[metric]]
        name = "avg_daily_shipped"
        formula = "avg_daily_shipped"

        [[metric]]
        name = "stock_days"
        formula = "days_on_hand"
        depends_on = ["sellable_qty", "avg_daily_shipped"]
        mart_table = "mart_custom_health"
    "#;
    let registry = from_toml_str(text).unwrap();
    let spec = registry.get("stock_days").unwrap();

    // Overridden fields win; the rest comes from the catalog entry.
    assert_eq!(spec.mart_table, "mart_custom_health");
    assert_eq!(spec.granularity.dims(), ["item", "warehouse"]);
    assert_eq!(
        spec.policy,
        ExceptionPolicy::ClampRatio { ceiling: 999.0 }
    );
}

#[test]
fn test_policy_override_parses_tagged_variants() {
    // Unit variants are plain strings, struct variants are tables.
    let with_clamp = r#"
        [[metric]]
        name = "sellable_qty"
        formula = "sellable_qty"

        [[metric]]
        name = "avg_daily_shipped"
        formula = "avg_daily_shipped"

        [[metric]]
        name = "loose_doh"
        formula = "days_on_hand"
        depends_on = ["sellable_qty", "avg_daily_shipped"]
        policy = { clamp_ratio = { ceiling = 500.0 } }
    "#;
    let registry = from_toml_str(with_clamp).unwrap();
    assert_eq!(
        registry.get("loose_doh").unwrap().policy,
        ExceptionPolicy::ClampRatio { ceiling: 500.0 }
    );
}

#[test]
fn test_invalid_catalog_errors_propagate_from_validation() {
    let text = r#"
        [[metric]]
        name = "dup"
        formula = "on_hand_qty"

        [[metric]]
        name = "dup"
        formula = "expired_qty"
    "#;
    let err = from_toml_str(text).unwrap_err();
    assert!(matches!(err, LoaderError::Registry(_)));
}

#[test]
fn test_unparseable_toml_is_a_parse_error() {
    let err = from_toml_str("[[metric]\nname = ").unwrap_err();
    assert!(matches!(err, LoaderError::Parse(_)));
}

#[test]
fn test_derived_formula_with_empty_depends_on_is_rejected() {
    // days_on_hand reads two prior tables; clearing depends_on would make
    // it read empty tables and emit no rows, so validation rejects it.
    let text = r#"
        [[metric]]
        name = "stock_days"
        formula = "days_on_hand"
        depends_on = []
    "#;
    let err = from_toml_str(text).unwrap_err();
    assert!(matches!(err, LoaderError::Registry(_)));
}

#[test]
fn test_dangling_dependency_in_subset_is_rejected() {
    // days_on_hand's default depends_on references metrics absent from
    // this file, so the subset must fail validation loudly.
    let text = r#"
        [[metric]]
        name = "days_on_hand"
        formula = "days_on_hand"
    "#;
    assert!(from_toml_str(text).is_err());
}
