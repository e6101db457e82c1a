//! Finalization: accumulated counts -> ranked report rows.

use std::cmp::Ordering;

use crate::models::{AccumulatorEntry, AccumulatorState, ItemCounts, ItemId, OutputRow, UnitItemStats};

/// Number of items listed in `top_items`.
pub const TOP_ITEMS: usize = 3;

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Item shares for one unit, most frequent first.
///
/// Ties are ordered by ascending item id. When the unit has no item
/// observations at all, every share is 0.
pub fn item_frequencies(counts: &ItemCounts) -> Vec<(ItemId, f64)> {
    let total: u64 = counts.values().sum();

    let mut sorted: Vec<(ItemId, u64)> = counts.iter().map(|(&id, &c)| (id, c)).collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    sorted
        .into_iter()
        .map(|(id, count)| {
            let freq = if total == 0 {
                0.0
            } else {
                round_to(count as f64 / total as f64, 3)
            };
            (id, freq)
        })
        .collect()
}

fn unit_stats(entry: &AccumulatorEntry, character_id: &str) -> UnitItemStats {
    let item_freq = entry
        .item_histogram
        .get(character_id)
        .map(item_frequencies)
        .unwrap_or_default();

    UnitItemStats {
        character_id: character_id.to_string(),
        top_items: item_freq.iter().take(TOP_ITEMS).map(|(id, _)| *id).collect(),
        item_freq,
    }
}

/// Build the report row for a single entry. `entry.picks` must be non-zero.
pub fn finalize_entry(entry: &AccumulatorEntry) -> OutputRow {
    let picks = entry.picks as f64;

    OutputRow {
        patch: entry.patch.clone(),
        comp_key: entry.comp_key.clone(),
        picks: entry.picks,
        avg_placement: round_to(entry.placement_sum as f64 / picks, 2),
        winrate: round_to(entry.wins as f64 / picks * 100.0, 1),
        unit_set: entry.unit_set.clone(),
        units: entry
            .unit_set
            .iter()
            .map(|id| unit_stats(entry, id))
            .collect(),
    }
}

/// Report ordering: best average placement first, then most picks, then
/// patch and composition key.
pub fn compare_rows(a: &OutputRow, b: &OutputRow) -> Ordering {
    a.avg_placement
        .total_cmp(&b.avg_placement)
        .then_with(|| b.picks.cmp(&a.picks))
        .then_with(|| a.patch.cmp(&b.patch))
        .then_with(|| a.comp_key.cmp(&b.comp_key))
}

/// Finalize every entry with at least `min_picks` picks, ranked.
///
/// Entries with zero picks have no defined averages and are never reported,
/// even with a threshold of 0.
pub fn finalize(state: &AccumulatorState, min_picks: u64) -> Vec<OutputRow> {
    let mut rows: Vec<OutputRow> = state
        .iter()
        .filter(|e| e.picks > 0 && e.picks >= min_picks)
        .map(finalize_entry)
        .collect();

    rows.sort_by(compare_rows);
    rows
}

/// The first `top_n` rows of [`finalize`].
pub fn finalize_top(state: &AccumulatorState, min_picks: u64, top_n: usize) -> Vec<OutputRow> {
    let mut rows = finalize(state, min_picks);
    rows.truncate(top_n);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculate::count_matches;
    use crate::models::{MatchInfo, Participant, Unit};

    fn entry(key: &str, picks: u64, wins: u64, placement_sum: u64) -> AccumulatorEntry {
        let mut e = AccumulatorEntry::new("13.24", key, vec!["Jinx".into()]);
        e.picks = picks;
        e.wins = wins;
        e.placement_sum = placement_sum;
        e
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(2.0 / 3.0, 3), 0.667);
        assert_eq!(round_to(1.0 / 3.0, 3), 0.333);
        assert_eq!(round_to(4.125, 2), 4.13);
        assert_eq!(round_to(33.33333, 1), 33.3);
    }

    #[test]
    fn test_scenario_two_picks_one_win() {
        let matches = vec![
            MatchInfo::new(
                "13.24.1",
                vec![Participant::new(1, vec![Unit::new("Jinx", vec![1, 2])])],
            ),
            MatchInfo::new(
                "13.24.1",
                vec![Participant::new(3, vec![Unit::new("Jinx", vec![2, 1])])],
            ),
        ];

        let rows = finalize(&count_matches(&matches), 0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].patch, "13.24");
        assert_eq!(rows[0].picks, 2);
        assert_eq!(rows[0].avg_placement, 2.0);
        assert_eq!(rows[0].winrate, 50.0);
    }

    #[test]
    fn test_item_frequency_scenario() {
        let mut e = entry("Jinx:5.5.7", 1, 0, 4);
        e.add_item("Jinx", 5, 2);
        e.add_item("Jinx", 7, 1);

        let row = finalize_entry(&e);
        let jinx = row.unit("Jinx").unwrap();
        assert_eq!(jinx.item_freq, vec![(5, 0.667), (7, 0.333)]);
        assert_eq!(jinx.top_items, vec![5, 7]);
    }

    #[test]
    fn test_item_frequency_ties_by_item_id() {
        let counts: ItemCounts = [(9, 2), (3, 2), (4, 1)].into_iter().collect();
        let freq = item_frequencies(&counts);
        let ids: Vec<i64> = freq.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![3, 9, 4]);
    }

    #[test]
    fn test_zero_total_frequencies_are_zero() {
        let counts: ItemCounts = [(1, 0), (2, 0)].into_iter().collect();
        assert!(item_frequencies(&counts).iter().all(|(_, f)| *f == 0.0));
    }

    #[test]
    fn test_top_items_capped_at_three() {
        let mut e = entry("Jinx:1.2.3", 4, 0, 16);
        for (item, count) in [(1, 5), (2, 4), (3, 3), (4, 2)] {
            e.add_item("Jinx", item, count);
        }

        let row = finalize_entry(&e);
        assert_eq!(row.units[0].top_items, vec![1, 2, 3]);
        assert_eq!(row.units[0].item_freq.len(), 4);
    }

    #[test]
    fn test_unit_without_histogram_yields_empty_stats() {
        let e = entry("Jinx:", 1, 1, 1);
        let row = finalize_entry(&e);
        assert_eq!(row.units.len(), 1);
        assert!(row.units[0].top_items.is_empty());
        assert!(row.units[0].item_freq.is_empty());
    }

    #[test]
    fn test_threshold_filters_rows() {
        let state: AccumulatorState = vec![
            entry("A:", 49, 5, 200),
            entry("B:", 50, 5, 200),
            entry("C:", 0, 0, 0),
        ]
        .into_iter()
        .collect();

        let rows = finalize(&state, 50);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].comp_key, "B:");

        // Zero-pick entries never appear
        assert_eq!(finalize(&state, 0).len(), 2);
    }

    #[test]
    fn test_ranking_by_placement_then_picks() {
        let state: AccumulatorState = vec![
            entry("Worse:", 10, 0, 50),  // 5.00
            entry("Fewer:", 10, 2, 30),  // 3.00
            entry("More:", 20, 4, 60),   // 3.00
            entry("Best:", 5, 5, 5),     // 1.00
        ]
        .into_iter()
        .collect();

        let keys: Vec<String> = finalize(&state, 0).into_iter().map(|r| r.comp_key).collect();
        assert_eq!(keys, vec!["Best:", "More:", "Fewer:", "Worse:"]);
    }

    #[test]
    fn test_finalize_top_truncates() {
        let state: AccumulatorState = (0..30)
            .map(|i| entry(&format!("K{i}:"), 10, 0, 10 + i))
            .collect();

        let top = finalize_top(&state, 0, 20);
        assert_eq!(top.len(), 20);
        assert_eq!(top[0].comp_key, "K0:");
    }
}
