//! Aggregation engine.
//!
//! Turns validated match records into ranked composition statistics:
//! - Composition signatures (order-independent keys)
//! - Batch counting into an accumulator state
//! - Cross-run merging of accumulator states
//! - Finalization into ranked report rows
//!
//! Everything here is synchronous and free of I/O.

pub mod counter;
pub mod finalize;
pub mod merge;
pub mod signature;

pub use counter::{count_matches, count_participant, valid_placement, MISSING_PLACEMENT};
pub use finalize::{finalize, finalize_entry, finalize_top, item_frequencies, round_to};
pub use merge::{merge_entry, merge_into, merged};
pub use signature::{composition_key, derive_signature, normalize_patch, unit_set};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchInfo, Participant, Unit};

    #[test]
    fn test_accumulate_across_runs() {
        let run = |placement| {
            vec![MatchInfo::new(
                "13.24.7",
                vec![Participant::new(placement, vec![Unit::new("Jinx", vec![5])])],
            )]
        };

        let mut state = count_matches(&run(1));
        merge_into(&mut state, count_matches(&run(4)));
        merge_into(&mut state, count_matches(&run(4)));

        let rows = finalize(&state, 3);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].picks, 3);
        assert_eq!(rows[0].avg_placement, 3.0);
        assert_eq!(rows[0].winrate, 33.3);
        assert_eq!(rows[0].units[0].item_freq, vec![(5, 1.0)]);
    }
}
