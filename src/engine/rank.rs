//! Generic partitioned window ranking.
//!
//! Partitions input rows by a key, sorts within each partition by the
//! supplied ordering, and assigns consecutive ranks 1..N with no ties and
//! no gaps. The ordering must be total; callers supply a unique secondary
//! key (lot id, record id) so that identical primary values still order
//! deterministically regardless of input order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

/// Assign 1..N per partition.
///
/// Returns one rank per input row, in input-row order. Pure: identical
/// input yields identical output.
pub fn rank_partitions<T, K, F>(rows: &[T], partition_key: K, ordering: F) -> Vec<u32>
where
    K: Fn(&T) -> String,
    F: Fn(&T, &T) -> Ordering,
{
    let mut partitions: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        partitions.entry(partition_key(row)).or_default().push(idx);
    }

    let mut ranks = vec![0u32; rows.len()];
    for indices in partitions.values_mut() {
        // Stable sort plus a total ordering: input order cannot leak into
        // the result.
        indices.sort_by(|&a, &b| ordering(&rows[a], &rows[b]));
        for (pos, &idx) in indices.iter().enumerate() {
            ranks[idx] = pos as u32 + 1;
        }
    }
    ranks
}

/// FEFO lot-priority ordering: ascending expiry date with missing expiry
/// sorted last, then ascending lot identifier.
pub fn fefo_ordering(
    a_expiry: Option<NaiveDate>,
    a_lot: &str,
    b_expiry: Option<NaiveDate>,
    b_lot: &str,
) -> Ordering {
    match (a_expiry, b_expiry) {
        (Some(a), Some(b)) => a.cmp(&b).then_with(|| a_lot.cmp(b_lot)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a_lot.cmp(b_lot),
    }
}

/// Grain-alignment ordering for picking one canonical effective-dated row:
/// descending effective date, then descending insertion id.
pub fn canonical_ordering(
    a_effective: NaiveDate,
    a_id: u64,
    b_effective: NaiveDate,
    b_id: u64,
) -> Ordering {
    b_effective
        .cmp(&a_effective)
        .then_with(|| b_id.cmp(&a_id))
}
