//! Dual aggregation for coverage reporting.
//!
//! `known_sum` sums only rows flagged Actual; Partial rows are omitted
//! entirely, never zero-filled. `total_sum_min` sums every row with missing
//! values treated as zero, a deliberate lower bound that must always be
//! labeled as a minimum. Both come out of one pass over the same row set so
//! they can never disagree about which rows existed.

use std::collections::BTreeMap;

use serde::Serialize;

use super::coverage::Covered;
use crate::facts::PartitionKey;

/// The (known-only, zero-filled minimum) aggregate pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DualSum {
    pub known_sum: f64,
    pub total_sum_min: f64,
    /// Rows excluded from known_sum because their flag was Partial.
    pub partial_rows: usize,
}

impl DualSum {
    pub fn accumulate(&mut self, v: &Covered<f64>) {
        let present = v.value.unwrap_or(0.0);
        self.total_sum_min += present;
        if v.is_actual() {
            self.known_sum += present;
        } else {
            self.partial_rows += 1;
        }
    }
}

/// One-pass dual aggregation over a group.
pub fn dual_sum<'a, I>(values: I) -> DualSum
where
    I: IntoIterator<Item = &'a Covered<f64>>,
{
    let mut acc = DualSum::default();
    for v in values {
        acc.accumulate(v);
    }
    acc
}

/// Dual aggregation grouped by a key projection. BTreeMap output keeps
/// group iteration order deterministic.
pub fn dual_sum_by<'a, I, F>(rows: I, key_fn: F) -> BTreeMap<PartitionKey, DualSum>
where
    I: IntoIterator<Item = (&'a PartitionKey, &'a Covered<f64>)>,
    F: Fn(&PartitionKey) -> PartitionKey,
{
    let mut groups: BTreeMap<PartitionKey, DualSum> = BTreeMap::new();
    for (key, value) in rows {
        groups.entry(key_fn(key)).or_default().accumulate(value);
    }
    groups
}
