//! Accumulated per-composition counts.
//!
//! The accumulator state is both the output of counting a batch and the
//! persisted form that later runs merge into.

use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};

use super::{ItemId, UnitId};

/// Item id -> observation count for a single unit.
pub type ItemCounts = BTreeMap<ItemId, u64>;

/// Identity of an accumulator entry: a composition on a given patch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompId {
    pub patch: String,
    pub comp_key: String,
}

impl CompId {
    pub fn new(patch: impl Into<String>, comp_key: impl Into<String>) -> Self {
        Self {
            patch: patch.into(),
            comp_key: comp_key.into(),
        }
    }
}

impl std::fmt::Display for CompId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.patch, self.comp_key)
    }
}

/// Aggregate counts for one (patch, composition key) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorEntry {
    pub patch: String,
    pub comp_key: String,

    /// Times this composition was observed
    pub picks: u64,

    /// Observations with placement 1
    pub wins: u64,

    /// Sum of placements (missing placement counts as 9)
    pub placement_sum: u64,

    /// Sorted, deduplicated unit identifiers. Fixed at creation.
    pub unit_set: Vec<UnitId>,

    /// Per-unit item histograms
    pub item_histogram: BTreeMap<UnitId, ItemCounts>,
}

impl AccumulatorEntry {
    /// Create an empty entry with zeroed counters.
    pub fn new(
        patch: impl Into<String>,
        comp_key: impl Into<String>,
        unit_set: Vec<UnitId>,
    ) -> Self {
        Self {
            patch: patch.into(),
            comp_key: comp_key.into(),
            picks: 0,
            wins: 0,
            placement_sum: 0,
            unit_set,
            item_histogram: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> CompId {
        CompId::new(self.patch.clone(), self.comp_key.clone())
    }

    /// Histogram for a unit, created empty on first access.
    pub fn unit_histogram_mut(&mut self, unit_id: &str) -> &mut ItemCounts {
        self.item_histogram
            .entry(unit_id.to_string())
            .or_default()
    }

    /// Add `count` observations of `item` for `unit_id`.
    pub fn add_item(&mut self, unit_id: &str, item: ItemId, count: u64) {
        *self.unit_histogram_mut(unit_id).entry(item).or_insert(0) += count;
    }

    /// Total item observations recorded for a unit.
    pub fn unit_item_total(&self, unit_id: &str) -> u64 {
        self.item_histogram
            .get(unit_id)
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }

    /// Check the entry invariants: `wins <= picks`, `placement_sum >= picks`,
    /// and every histogram belongs to a unit in `unit_set`.
    pub fn is_consistent(&self) -> bool {
        self.wins <= self.picks
            && self.placement_sum >= self.picks
            && self
                .item_histogram
                .keys()
                .all(|unit| self.unit_set.contains(unit))
    }
}

/// All accumulator entries, keyed by (patch, composition key).
///
/// Ordered so that iteration, persistence and ranking are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulatorState {
    entries: BTreeMap<CompId, AccumulatorEntry>,
}

impl AccumulatorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &CompId) -> Option<&AccumulatorEntry> {
        self.entries.get(id)
    }

    /// Look up an entry, creating it with `unit_set` if absent.
    pub fn entry_or_create(
        &mut self,
        id: CompId,
        unit_set: impl FnOnce() -> Vec<UnitId>,
    ) -> &mut AccumulatorEntry {
        self.entries.entry(id).or_insert_with_key(|id| {
            AccumulatorEntry::new(id.patch.clone(), id.comp_key.clone(), unit_set())
        })
    }

    /// Map-level entry access, used by the merger.
    pub fn entry(&mut self, id: CompId) -> btree_map::Entry<'_, CompId, AccumulatorEntry> {
        self.entries.entry(id)
    }

    /// Insert an entry, replacing any existing one with the same identity.
    pub fn insert(&mut self, entry: AccumulatorEntry) -> Option<AccumulatorEntry> {
        self.entries.insert(entry.id(), entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccumulatorEntry> {
        self.entries.values()
    }

    /// Sum of `picks` across every entry.
    pub fn total_picks(&self) -> u64 {
        self.entries.values().map(|e| e.picks).sum()
    }
}

impl IntoIterator for AccumulatorState {
    type Item = AccumulatorEntry;
    type IntoIter = btree_map::IntoValues<CompId, AccumulatorEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl FromIterator<AccumulatorEntry> for AccumulatorState {
    fn from_iter<I: IntoIterator<Item = AccumulatorEntry>>(iter: I) -> Self {
        let mut state = Self::new();
        for entry in iter {
            state.insert(entry);
        }
        state
    }
}
