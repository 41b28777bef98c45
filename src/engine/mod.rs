//! KPI computation engine.
//!
//! Orchestrates one run: evaluate every registered metric against a fact
//! set, assemble denormalized mart rows per target table, compute dual
//! rollup aggregates, and materialize the result. Evaluation is purely
//! deterministic; two runs over the same facts, registry, and `as_of`
//! produce byte-identical output and therefore the same run digest.

pub mod aggregate;
pub mod asof;
pub mod coverage;
pub mod rank;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::engine::aggregate::{dual_sum_by, DualSum};
use crate::engine::coverage::CoverageFlag;
use crate::eval::{evaluate, GrainViolation};
use crate::facts::{FactSet, PartitionKey};
use crate::mart::{MartDb, MartError, MartRow};
use crate::registry::{MetricRegistry, MetricSpec};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Mart error: {0}")]
    Mart(#[from] MartError),

    #[error("Failed to serialize run output for digest: {0}")]
    Digest(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Summary of one engine run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Rows written per mart table (rollup tables included).
    pub rows_written: BTreeMap<String, usize>,
    /// Partitions excluded by grain violations.
    pub excluded: Vec<GrainViolationReport>,
    /// Metric cells flagged PARTIAL across all written rows.
    pub partial_cells: usize,
    /// SHA256 over the full materialized output, for determinism checks.
    pub digest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrainViolationReport {
    pub metric: String,
    pub key: String,
}

impl From<&GrainViolation> for GrainViolationReport {
    fn from(v: &GrainViolation) -> Self {
        Self {
            metric: v.metric.clone(),
            key: v.key.to_string(),
        }
    }
}

pub struct Engine {
    registry: MetricRegistry,
}

impl Engine {
    pub fn new(registry: MetricRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Execute one full run: evaluate, assemble, roll up, materialize.
    ///
    /// A grain violation drops the whole mart-table row for the violated
    /// key, not just the offending metric's cell: partial rows where one
    /// column comes from a corrupt partition are worse than a missing row.
    pub fn run(
        &self,
        facts: &FactSet,
        mart: &mut MartDb,
        as_of: NaiveDate,
    ) -> EngineResult<RunReport> {
        mart.begin_run();
        let output = evaluate(facts, &self.registry, as_of);

        let mut by_table: BTreeMap<&str, Vec<&MetricSpec>> = BTreeMap::new();
        for spec in self.registry.specs() {
            by_table
                .entry(spec.mart_table.as_str())
                .or_default()
                .push(spec);
        }

        let mut dropped: BTreeMap<&str, BTreeSet<&PartitionKey>> = BTreeMap::new();
        for v in &output.violations {
            if let Some(spec) = self.registry.get(&v.metric) {
                dropped
                    .entry(spec.mart_table.as_str())
                    .or_default()
                    .insert(&v.key);
            }
        }

        let mut rows_written: BTreeMap<String, usize> = BTreeMap::new();
        let mut partial_cells = 0usize;
        let mut snapshot: Vec<(String, String, Vec<(String, Option<f64>, CoverageFlag)>)> =
            Vec::new();

        for (table, specs) in &by_table {
            let dims = specs[0].granularity.dims().to_vec();
            let metrics: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();

            let mut keys: BTreeSet<&PartitionKey> = BTreeSet::new();
            for spec in specs {
                if let Some(t) = output.metrics.get(&spec.name) {
                    keys.extend(t.keys());
                }
            }
            let violated = dropped.get(table);

            let mut rows: Vec<MartRow> = Vec::new();
            for key in keys {
                if violated.is_some_and(|d| d.contains(key)) {
                    continue;
                }
                let mut values = Vec::with_capacity(specs.len());
                for spec in specs {
                    match output.metrics.get(&spec.name).and_then(|t| t.get(key)) {
                        Some(c) => {
                            if !c.is_actual() {
                                partial_cells += 1;
                            }
                            values.push((spec.name.clone(), c.value, c.flag));
                        }
                        // metric produced no row at this key: NULL + PARTIAL
                        None => {
                            partial_cells += 1;
                            values.push((spec.name.clone(), None, CoverageFlag::Partial));
                        }
                    }
                }
                rows.push(MartRow {
                    key: key.clone(),
                    values,
                });
            }

            for row in &rows {
                snapshot.push((
                    table.to_string(),
                    row.key.to_string(),
                    row.values.clone(),
                ));
            }

            let written = mart.materialize(table, &dims, &metrics, &rows)?;
            rows_written.insert(table.to_string(), written);
        }

        let mut rollup_snapshot: Vec<(String, String, String, f64, f64, usize)> = Vec::new();
        for spec in self.registry.specs() {
            let Some(rollup_dims) = &spec.rollup else {
                continue;
            };
            let Some(table) = output.metrics.get(&spec.name) else {
                continue;
            };
            let prefix = rollup_dims.len();
            let groups: Vec<(PartitionKey, DualSum)> =
                dual_sum_by(table.iter(), |k| k.prefix(prefix))
                    .into_iter()
                    .collect();

            let rollup_table = format!("{}_rollup", spec.mart_table);
            for (key, agg) in &groups {
                rollup_snapshot.push((
                    rollup_table.clone(),
                    key.to_string(),
                    spec.name.clone(),
                    agg.known_sum,
                    agg.total_sum_min,
                    agg.partial_rows,
                ));
            }

            let written =
                mart.materialize_rollup(&spec.mart_table, rollup_dims, &spec.name, &groups)?;
            *rows_written.entry(rollup_table).or_insert(0) += written;
        }

        let digest = run_digest(&(&snapshot, &rollup_snapshot))?;

        Ok(RunReport {
            rows_written,
            excluded: output.violations.iter().map(Into::into).collect(),
            partial_cells,
            digest,
        })
    }
}

/// SHA256 hash of a serializable value, as lowercase hex.
///
/// The value is serialized to JSON first, so equal outputs always hash
/// equally regardless of how they were assembled.
pub fn run_digest<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
