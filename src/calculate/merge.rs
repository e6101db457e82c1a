//! Cross-run merging of accumulator states.

use std::collections::btree_map::Entry;

use tracing::debug;

use crate::models::{AccumulatorEntry, AccumulatorState};

/// Add `add`'s counts into `base`.
///
/// `unit_set` and identity stay as recorded in `base`; histograms for units
/// `base` has not seen yet are created.
pub fn merge_entry(base: &mut AccumulatorEntry, add: &AccumulatorEntry) {
    base.picks += add.picks;
    base.wins += add.wins;
    base.placement_sum += add.placement_sum;

    for (unit_id, counts) in &add.item_histogram {
        let dest = base.unit_histogram_mut(unit_id);
        for (&item, &count) in counts {
            *dest.entry(item).or_insert(0) += count;
        }
    }
}

/// Merge `add` into `base` in place.
///
/// Counts combine additively, so merging is commutative and associative.
/// It is not idempotent: callers must merge each batch at most once.
pub fn merge_into(base: &mut AccumulatorState, add: AccumulatorState) {
    let mut inserted = 0usize;
    let mut combined = 0usize;

    for entry in add {
        match base.entry(entry.id()) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
                inserted += 1;
            }
            Entry::Occupied(mut slot) => {
                merge_entry(slot.get_mut(), &entry);
                combined += 1;
            }
        }
    }

    debug!(
        "Merged state: {} new compositions, {} combined, {} total",
        inserted,
        combined,
        base.len()
    );
}

/// Merge two states into a new one.
pub fn merged(mut base: AccumulatorState, add: AccumulatorState) -> AccumulatorState {
    merge_into(&mut base, add);
    base
}
