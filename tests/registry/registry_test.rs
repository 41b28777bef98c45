//! Registry validation and evaluation staging.

use granary::facts::Granularity;
use granary::registry::catalog::builtin_registry;
use granary::registry::{
    ExceptionPolicy, FormulaRef, MetricRegistry, MetricSpec, RegistryError,
};

fn base_spec(name: &str, depends_on: &[&str]) -> MetricSpec {
    MetricSpec {
        name: name.to_string(),
        granularity: Granularity::new(["item", "warehouse"]),
        required_inputs: vec![],
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        formula: FormulaRef::OnHandQty,
        policy: ExceptionPolicy::None,
        mart_table: "mart_test".to_string(),
        rollup: None,
    }
}

#[test]
fn test_builtin_catalog_validates_with_twenty_metrics() {
    let registry = builtin_registry().unwrap();
    assert_eq!(registry.specs().len(), 20);
    assert_eq!(registry.base_currency(), "KRW");
}

#[test]
fn test_every_dependency_lands_in_an_earlier_stage() {
    let registry = builtin_registry().unwrap();
    let mut seen = std::collections::HashSet::new();
    for stage in registry.stages() {
        for spec in &stage {
            for dep in &spec.depends_on {
                assert!(
                    seen.contains(dep.as_str()),
                    "{} must be staged before {}",
                    dep,
                    spec.name
                );
            }
        }
        for spec in &stage {
            seen.insert(spec.name.clone());
        }
    }
    assert_eq!(seen.len(), 20);
}

#[test]
fn test_duplicate_metric_names_are_rejected() {
    let err = MetricRegistry::new(vec![base_spec("m", &[]), base_spec("m", &[])], "KRW")
        .unwrap_err();
    assert_eq!(err, RegistryError::DuplicateMetric("m".to_string()));
}

#[test]
fn test_unknown_dependency_is_rejected() {
    let err = MetricRegistry::new(vec![base_spec("m", &["ghost"])], "KRW").unwrap_err();
    assert!(matches!(
        err,
        RegistryError::UnknownDependency { metric, dependency }
            if metric == "m" && dependency == "ghost"
    ));
}

#[test]
fn test_dependency_cycle_is_rejected_before_evaluation() {
    let specs = vec![base_spec("a", &["b"]), base_spec("b", &["a"])];
    let err = MetricRegistry::new(specs, "KRW").unwrap_err();
    assert!(matches!(err, RegistryError::Cycle { .. }));
    insta::assert_snapshot!(err, @"Cyclic metric dependency: a -> b -> a");
}

#[test]
fn test_self_dependency_is_a_cycle() {
    let err = MetricRegistry::new(vec![base_spec("m", &["m"])], "KRW").unwrap_err();
    assert!(matches!(err, RegistryError::Cycle { .. }));
}

#[test]
fn test_rollup_must_be_strict_prefix_of_granularity() {
    let mut spec = base_spec("m", &[]);
    spec.rollup = Some(vec!["item".to_string(), "warehouse".to_string()]);
    let err = MetricRegistry::new(vec![spec], "KRW").unwrap_err();
    assert!(matches!(err, RegistryError::InvalidRollup { .. }));

    let mut spec = base_spec("m", &[]);
    spec.rollup = Some(vec!["warehouse".to_string()]);
    let err = MetricRegistry::new(vec![spec], "KRW").unwrap_err();
    assert!(matches!(err, RegistryError::InvalidRollup { .. }));

    let mut spec = base_spec("m", &[]);
    spec.rollup = Some(vec!["item".to_string()]);
    assert!(MetricRegistry::new(vec![spec], "KRW").is_ok());
}

#[test]
fn test_derived_formula_must_declare_its_prior_reads() {
    let mut spec = base_spec("doh", &[]);
    spec.formula = FormulaRef::DaysOnHand;
    let err = MetricRegistry::new(vec![spec], "KRW").unwrap_err();
    assert!(matches!(
        err,
        RegistryError::DependencyArity {
            metric,
            expected: 2,
            actual: 0,
        } if metric == "doh"
    ));
}

#[test]
fn test_metrics_sharing_a_mart_table_must_agree_on_granularity() {
    // Same arity is not enough: a (vendor, item) key written next to an
    // (item, warehouse) key would land values in the wrong column space.
    let mut po = base_spec("open_po_qty", &[]);
    po.granularity = Granularity::new(["vendor", "item"]);
    let mut shipped = base_spec("avg_daily_shipped", &[]);
    shipped.granularity = Granularity::new(["item", "warehouse"]);

    let err = MetricRegistry::new(vec![po, shipped], "KRW").unwrap_err();
    assert!(matches!(
        err,
        RegistryError::MixedTableGranularity { table, metric, .. }
            if table == "mart_test" && metric == "avg_daily_shipped"
    ));

    // Identical granularities may share a table.
    let specs = vec![base_spec("a", &[]), base_spec("b", &[])];
    assert!(MetricRegistry::new(specs, "KRW").is_ok());
}

#[test]
fn test_transitive_dependencies_deepen_stages() {
    let specs = vec![
        base_spec("c", &["b"]),
        base_spec("a", &[]),
        base_spec("b", &["a"]),
    ];
    let registry = MetricRegistry::new(specs, "KRW").unwrap();
    let stages: Vec<Vec<String>> = registry
        .stages()
        .map(|stage| stage.iter().map(|s| s.name.clone()).collect())
        .collect();
    assert_eq!(stages.len(), 3);
    assert_eq!(stages[0], vec!["a"]);
    assert_eq!(stages[1], vec!["b"]);
    assert_eq!(stages[2], vec!["c"]);
}
