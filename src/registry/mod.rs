//! Declarative metric registry.
//!
//! The registry is the sole externally-editable configuration surface: a
//! listing of metric name -> granularity, required inputs, formula
//! reference, exception policy, and target mart table. Derived metrics
//! declare the metrics they read; the dependency graph is checked for
//! cycles at load time and evaluation proceeds in topologically sorted
//! stages, so a metric can only ever see outputs of earlier stages.

pub mod catalog;
pub mod loader;

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::facts::Granularity;

/// Fact-table inputs a metric's formula reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    InventorySnapshots,
    Orders,
    Shipments,
    PurchaseOrders,
    Receipts,
    CostComponents,
    Settlements,
}

/// Reference to a built-in formula implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaRef {
    OnHandQty,
    SellableQty,
    ExpiredQty,
    FefoRank,
    ExpiryRiskValue,
    AvgDailyShipped,
    DaysOnHand,
    InventoryTurnover,
    OpenPoQty,
    PoDelayDays,
    PoLeadDays,
    FulfillmentRate,
    OnTimeShipRate,
    LandedUnitCost,
    Cogs,
    GrossSales,
    NetRevenue,
    RefundRate,
    GrossMargin,
    ContributionShare,
}

impl FormulaRef {
    /// Number of prior metric tables the formula reads. The first
    /// `prior_reads` entries of `depends_on` name those tables, in order.
    pub fn prior_reads(&self) -> usize {
        match self {
            FormulaRef::DaysOnHand | FormulaRef::GrossMargin => 2,
            FormulaRef::InventoryTurnover | FormulaRef::ContributionShare => 1,
            _ => 0,
        }
    }
}

/// Exception policy applied by the evaluator around a formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionPolicy {
    /// Plain aggregation, no exception handling.
    None,
    /// Demand-normalized ratio: zero denominator clamps to the ceiling
    /// instead of producing an undefined or infinite result.
    ClampRatio { ceiling: f64 },
    /// Restrict input rows to transactions carrying a channel order id
    /// before aggregating; non-sale movements are excluded, not zeroed.
    SalesOnly,
    /// Additive cost rollup: missing components contribute nothing, but the
    /// flag is only Actual when every expected component is present.
    AdditiveRollup,
    /// Ratio-of-ratios: numerator and denominator must come from the same
    /// partition snapshot.
    SharedSnapshot,
}

/// One metric's declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    pub granularity: Granularity,
    pub required_inputs: Vec<InputKind>,
    /// Names of metrics this formula reads. Must be evaluated in an
    /// earlier stage. Order matters: derived formulas resolve their prior
    /// tables by position, so renaming a metric in a registry file works
    /// as long as `depends_on` names the renamed entries.
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub formula: FormulaRef,
    pub policy: ExceptionPolicy,
    pub mart_table: String,
    /// Optional rollup grouping: a strict prefix of the granularity dims.
    /// When present the engine writes a `<mart_table>_rollup` row per group
    /// with the dual (known_sum, total_sum_min) aggregate.
    #[serde(default)]
    pub rollup: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("Duplicate metric name: '{0}'")]
    DuplicateMetric(String),

    #[error("Metric '{metric}' depends on unknown metric '{dependency}'")]
    UnknownDependency { metric: String, dependency: String },

    #[error("Cyclic metric dependency: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("Metric '{metric}' has invalid rollup: {reason}")]
    InvalidRollup { metric: String, reason: String },

    #[error(
        "Metric '{metric}' formula reads {expected} prior metric(s), \
         but depends_on lists {actual}"
    )]
    DependencyArity {
        metric: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Metric '{metric}' targets table '{table}' at granularity {actual}, \
         but the table is keyed at {expected}"
    )]
    MixedTableGranularity {
        table: String,
        metric: String,
        expected: String,
        actual: String,
    },
}

/// Validated metric catalog with evaluation stages.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    specs: Vec<MetricSpec>,
    /// Indices into `specs`, grouped by dependency depth. Stage 0 holds
    /// base metrics; stage k metrics read only stages < k.
    stages: Vec<Vec<usize>>,
    base_currency: String,
}

impl MetricRegistry {
    /// Validate specs and compute evaluation stages. Fails fast on
    /// duplicates, dangling or under-declared dependencies, invalid
    /// rollups, mixed table granularities, and cycles, before any
    /// partition is processed.
    pub fn new(specs: Vec<MetricSpec>, base_currency: impl Into<String>) -> Result<Self, RegistryError> {
        let mut by_name: HashMap<&str, usize> = HashMap::new();
        for (idx, spec) in specs.iter().enumerate() {
            if by_name.insert(spec.name.as_str(), idx).is_some() {
                return Err(RegistryError::DuplicateMetric(spec.name.clone()));
            }
        }

        // Metrics sharing a mart table become columns of one row per key,
        // so their declared key spaces must be identical, not merely the
        // same arity.
        let mut table_grain: HashMap<&str, &Granularity> = HashMap::new();
        for spec in &specs {
            match table_grain.get(spec.mart_table.as_str()) {
                Some(grain) if **grain != spec.granularity => {
                    return Err(RegistryError::MixedTableGranularity {
                        table: spec.mart_table.clone(),
                        metric: spec.name.clone(),
                        expected: grain.to_string(),
                        actual: spec.granularity.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    table_grain.insert(spec.mart_table.as_str(), &spec.granularity);
                }
            }
        }

        for spec in &specs {
            // A derived formula with too few dependencies would read an
            // empty prior table and silently emit nothing.
            let expected = spec.formula.prior_reads();
            if spec.depends_on.len() < expected {
                return Err(RegistryError::DependencyArity {
                    metric: spec.name.clone(),
                    expected,
                    actual: spec.depends_on.len(),
                });
            }
            for dep in &spec.depends_on {
                if !by_name.contains_key(dep.as_str()) {
                    return Err(RegistryError::UnknownDependency {
                        metric: spec.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            if let Some(rollup) = &spec.rollup {
                let dims = spec.granularity.dims();
                if rollup.is_empty() || rollup.len() >= dims.len() {
                    return Err(RegistryError::InvalidRollup {
                        metric: spec.name.clone(),
                        reason: "rollup must be a non-empty strict prefix of the granularity".into(),
                    });
                }
                if rollup.iter().zip(dims).any(|(r, d)| r != d) {
                    return Err(RegistryError::InvalidRollup {
                        metric: spec.name.clone(),
                        reason: format!(
                            "rollup [{}] is not a prefix of granularity {}",
                            rollup.join(", "),
                            spec.granularity
                        ),
                    });
                }
            }
        }

        let stages = Self::build_stages(&specs, &by_name)?;
        Ok(Self {
            specs,
            stages,
            base_currency: base_currency.into(),
        })
    }

    fn build_stages(
        specs: &[MetricSpec],
        by_name: &HashMap<&str, usize>,
    ) -> Result<Vec<Vec<usize>>, RegistryError> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..specs.len()).map(|i| graph.add_node(i)).collect();
        for (idx, spec) in specs.iter().enumerate() {
            for dep in &spec.depends_on {
                let dep_idx = by_name[dep.as_str()];
                if dep_idx == idx {
                    return Err(RegistryError::Cycle {
                        cycle: vec![spec.name.clone(), spec.name.clone()],
                    });
                }
                graph.add_edge(nodes[dep_idx], nodes[idx], ());
            }
        }

        // Strongly connected components of size > 1 are cycles. Tarjan
        // reports them in reverse topological order, so the first hit is
        // reported with a stable member order.
        for scc in tarjan_scc(&graph) {
            if scc.len() > 1 {
                let mut cycle: Vec<String> =
                    scc.iter().map(|&n| specs[graph[n]].name.clone()).collect();
                cycle.sort();
                let first = cycle[0].clone();
                cycle.push(first);
                return Err(RegistryError::Cycle { cycle });
            }
        }

        // Depth = 1 + max depth of dependencies. Acyclic by the check
        // above, so the fixpoint terminates within specs.len() passes.
        let mut depth = vec![0usize; specs.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for (idx, spec) in specs.iter().enumerate() {
                let want = spec
                    .depends_on
                    .iter()
                    .map(|dep| depth[by_name[dep.as_str()]] + 1)
                    .max()
                    .unwrap_or(0);
                if want > depth[idx] {
                    depth[idx] = want;
                    changed = true;
                }
            }
        }

        let max_depth = depth.iter().copied().max().unwrap_or(0);
        let mut stages: Vec<Vec<usize>> = vec![Vec::new(); max_depth + 1];
        for (idx, &d) in depth.iter().enumerate() {
            stages[d].push(idx);
        }
        Ok(stages)
    }

    pub fn specs(&self) -> &[MetricSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&MetricSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    /// Metric specs grouped into topologically ordered evaluation stages.
    pub fn stages(&self) -> impl Iterator<Item = Vec<&MetricSpec>> {
        self.stages
            .iter()
            .map(move |stage| stage.iter().map(|&i| &self.specs[i]).collect())
    }

    /// All distinct target mart tables, sorted.
    pub fn mart_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.specs.iter().map(|s| s.mart_table.as_str()).collect();
        tables.sort_unstable();
        tables.dedup();
        tables
    }
}
