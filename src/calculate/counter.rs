//! Batch counting: matches -> fresh accumulator state.

use tracing::debug;

use crate::models::{AccumulatorState, CompId, MatchInfo, Participant};

use super::signature::{derive_signature, normalize_patch};

/// Placement recorded when a participant's placement is missing.
pub const MISSING_PLACEMENT: u32 = 9;

/// Real lobby placements.
pub const PLACEMENT_RANGE: std::ops::RangeInclusive<u32> = 1..=8;

/// The placement if it is a real rank, `None` otherwise.
pub fn valid_placement(placement: Option<u32>) -> Option<u32> {
    placement.filter(|p| PLACEMENT_RANGE.contains(p))
}

/// Record one participant's observation into `state` under `patch`.
pub fn count_participant(state: &mut AccumulatorState, patch: &str, participant: &Participant) {
    let (comp_key, unit_set) = derive_signature(&participant.units);
    let entry = state.entry_or_create(CompId::new(patch, comp_key), || unit_set);

    let placement = valid_placement(participant.placement);
    entry.picks += 1;
    if placement == Some(1) {
        entry.wins += 1;
    }
    entry.placement_sum += u64::from(placement.unwrap_or(MISSING_PLACEMENT));

    for unit in &participant.units {
        let histogram = entry.unit_histogram_mut(&unit.character_id);
        for &item in &unit.items {
            *histogram.entry(item).or_insert(0) += 1;
        }
    }
}

/// Build a new accumulator state from a batch of matches.
///
/// Matches with no participants contribute nothing. The patch is
/// normalized once per match.
pub fn count_matches<'a, I>(matches: I) -> AccumulatorState
where
    I: IntoIterator<Item = &'a MatchInfo>,
{
    let mut state = AccumulatorState::new();
    let mut match_count = 0usize;
    let mut participant_count = 0usize;

    for m in matches {
        match_count += 1;
        if m.participants.is_empty() {
            continue;
        }

        let patch = normalize_patch(&m.game_version);
        for participant in &m.participants {
            count_participant(&mut state, &patch, participant);
            participant_count += 1;
        }
    }

    debug!(
        "Counted {} participants from {} matches into {} compositions",
        participant_count,
        match_count,
        state.len()
    );
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Unit;

    fn jinx(items: &[i64]) -> Vec<Unit> {
        vec![Unit::new("Jinx", items.to_vec())]
    }

    #[test]
    fn test_order_invariant_participants_share_entry() {
        let matches = vec![
            MatchInfo::new("13.24.1", vec![Participant::new(1, jinx(&[1, 2]))]),
            MatchInfo::new("13.24.1", vec![Participant::new(3, jinx(&[2, 1]))]),
            MatchInfo::new("13.24.1", vec![]),
        ];

        let state = count_matches(&matches);
        assert_eq!(state.len(), 1);

        let entry = state.get(&CompId::new("13.24", "Jinx:1.2")).unwrap();
        assert_eq!(entry.picks, 2);
        assert_eq!(entry.wins, 1);
        assert_eq!(entry.placement_sum, 4);
        assert_eq!(entry.unit_set, vec!["Jinx".to_string()]);
        assert_eq!(entry.item_histogram["Jinx"][&1], 2);
        assert_eq!(entry.item_histogram["Jinx"][&2], 2);
    }

    #[test]
    fn test_missing_placement_counts_as_nine_and_never_wins() {
        let matches = vec![MatchInfo::new(
            "14.1",
            vec![Participant {
                placement: None,
                units: jinx(&[]),
            }],
        )];

        let state = count_matches(&matches);
        let entry = state.get(&CompId::new("14.1", "Jinx:")).unwrap();
        assert_eq!(entry.picks, 1);
        assert_eq!(entry.wins, 0);
        assert_eq!(entry.placement_sum, 9);
    }

    #[test]
    fn test_out_of_range_placement_counts_as_missing() {
        let matches = vec![MatchInfo::new(
            "14.1",
            vec![Participant::new(0, jinx(&[])), Participant::new(12, jinx(&[]))],
        )];

        let state = count_matches(&matches);
        let entry = state.get(&CompId::new("14.1", "Jinx:")).unwrap();
        assert_eq!(entry.picks, 2);
        assert_eq!(entry.wins, 0);
        assert_eq!(entry.placement_sum, 18);
        assert!(entry.is_consistent());
    }

    #[test]
    fn test_patches_partition_entries() {
        let matches = vec![
            MatchInfo::new("13.24.1", vec![Participant::new(2, jinx(&[1]))]),
            MatchInfo::new("14.1.3", vec![Participant::new(2, jinx(&[1]))]),
        ];

        let state = count_matches(&matches);
        assert_eq!(state.len(), 2);
        assert!(state.get(&CompId::new("13.24", "Jinx:1")).is_some());
        assert!(state.get(&CompId::new("14.1", "Jinx:1")).is_some());
    }

    #[test]
    fn test_itemless_unit_gets_empty_histogram() {
        let units = vec![Unit::new("Jinx", vec![5]), Unit::new("Vi", vec![])];
        let matches = vec![MatchInfo::new("13.24", vec![Participant::new(4, units)])];

        let state = count_matches(&matches);
        let entry = state.get(&CompId::new("13.24", "Jinx:5|Vi:")).unwrap();
        assert!(entry.item_histogram["Vi"].is_empty());
        assert_eq!(entry.item_histogram["Jinx"][&5], 1);
    }

    #[test]
    fn test_picks_equal_participants() {
        let matches = vec![
            MatchInfo::new(
                "13.24",
                (1..=8)
                    .map(|p| Participant::new(p, jinx(&[p as i64])))
                    .collect(),
            ),
            MatchInfo::new("13.24", vec![Participant::new(1, jinx(&[1]))]),
        ];

        let state = count_matches(&matches);
        assert_eq!(state.total_picks(), 9);
        assert!(state.iter().all(|e| e.is_consistent()));
    }
}
