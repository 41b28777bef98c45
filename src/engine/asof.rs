//! As-of join resolution for slowly-changing values.
//!
//! "The value in effect as of date D" is the record with the greatest
//! `effective_date <= D`. Ties on effective_date are broken by the larger
//! insertion-order id, deterministically, never first-seen.
//!
//! Cost components are pre-aggregated per (item, effective_date) **before**
//! any join against transaction rows; joining the raw component table
//! would multiply every transaction row by the number of components
//! (grain explosion).

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::facts::{CostComponent, CostComponentKind};

/// Generic as-of map over keyed, effective-dated values.
///
/// Insertion id ties are resolved at insert time: for an identical
/// (key, effective_date) the entry with the larger id replaces the smaller.
#[derive(Debug, Clone)]
pub struct AsOf<V> {
    // key -> effective_date -> (insertion id, value)
    entries: BTreeMap<String, BTreeMap<NaiveDate, (u64, V)>>,
}

// Derived Default would require V: Default; an empty map needs no value.
impl<V> Default for AsOf<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> AsOf<V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: &str, effective_date: NaiveDate, id: u64, value: V) {
        let dates = self.entries.entry(key.to_string()).or_default();
        match dates.get(&effective_date) {
            Some((existing_id, _)) if *existing_id > id => {}
            _ => {
                dates.insert(effective_date, (id, value));
            }
        }
    }

    /// Value in effect as of `target_date`, or `None` when no record is
    /// effective yet. Absent data is a coverage signal, not an error.
    pub fn resolve(&self, key: &str, target_date: NaiveDate) -> Option<&V> {
        self.entries
            .get(key)?
            .range(..=target_date)
            .next_back()
            .map(|(_, (_, value))| value)
    }
}

/// Cost in effect for an item as of some date, pre-aggregated across
/// component kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCost {
    /// Sum of cost_per_unit over the components present at that date.
    pub unit_cost: f64,
    /// Component kinds that contributed to the sum.
    pub kinds_present: BTreeSet<CostComponentKind>,
}

impl ResolvedCost {
    /// True when every expected component kind contributed. A landed cost
    /// built from an incomplete set is usable but never Actual.
    pub fn complete(&self) -> bool {
        CostComponentKind::ALL
            .iter()
            .all(|k| self.kinds_present.contains(k))
    }
}

/// Per-item cost timeline with as-of resolution.
#[derive(Debug, Clone, Default)]
pub struct CostTimeline {
    costs: AsOf<ResolvedCost>,
}

impl CostTimeline {
    /// Build the timeline from raw component rows.
    ///
    /// Components are summed per (item, effective_date) first. Duplicate
    /// rows for the same (item, effective_date, kind) keep only the one
    /// with the largest record_id.
    pub fn from_components(components: &[CostComponent]) -> Self {
        // (item, date, kind) -> (record_id, cost)
        let mut canonical: BTreeMap<(String, NaiveDate, CostComponentKind), (u64, f64)> =
            BTreeMap::new();
        for c in components {
            let key = (c.item.clone(), c.effective_date, c.component_kind);
            match canonical.get(&key) {
                Some((existing_id, _)) if *existing_id > c.record_id => {}
                _ => {
                    canonical.insert(key, (c.record_id, c.cost_per_unit));
                }
            }
        }

        // Aggregate kinds into one entry per (item, date). The max record_id
        // among contributors carries forward as the tiebreak id.
        let mut grouped: BTreeMap<(String, NaiveDate), (u64, ResolvedCost)> = BTreeMap::new();
        for ((item, date, kind), (id, cost)) in canonical {
            let entry = grouped.entry((item, date)).or_insert_with(|| {
                (
                    0,
                    ResolvedCost {
                        unit_cost: 0.0,
                        kinds_present: BTreeSet::new(),
                    },
                )
            });
            entry.0 = entry.0.max(id);
            entry.1.unit_cost += cost;
            entry.1.kinds_present.insert(kind);
        }

        let mut costs = AsOf::new();
        for ((item, date), (id, resolved)) in grouped {
            costs.insert(&item, date, id, resolved);
        }
        Self { costs }
    }

    pub fn resolve(&self, item: &str, target_date: NaiveDate) -> Option<&ResolvedCost> {
        self.costs.resolve(item, target_date)
    }
}
