//! Strict match shapes consumed by the aggregation engine.
//!
//! Raw API payloads are validated and converted into these types by the
//! retrieval layer (`sync::riot`) before they reach the counter.

use serde::{Deserialize, Serialize};

/// Item identifier as reported by the match API.
pub type ItemId = i64;

/// Unit (champion) identifier, e.g. `"TFT10_Jinx"`.
pub type UnitId = String;

/// A fielded unit and its item loadout.
///
/// `items` is a multiset: duplicates are meaningful and order is not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub character_id: UnitId,
    #[serde(default)]
    pub items: Vec<ItemId>,
}

impl Unit {
    /// Create a unit with the given items.
    pub fn new(character_id: impl Into<String>, items: Vec<ItemId>) -> Self {
        Self {
            character_id: character_id.into(),
            items,
        }
    }
}

/// One player's result in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Final rank (1 = best). `None` when the payload omitted it.
    pub placement: Option<u32>,
    pub units: Vec<Unit>,
}

impl Participant {
    /// Create a participant with a known placement.
    pub fn new(placement: u32, units: Vec<Unit>) -> Self {
        Self {
            placement: Some(placement),
            units,
        }
    }
}

/// A validated match record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
    /// Raw game version string, e.g. `"Version 13.24.550.1234 (Dec 01 2023)"`.
    pub game_version: String,
    pub participants: Vec<Participant>,
}

impl MatchInfo {
    pub fn new(game_version: impl Into<String>, participants: Vec<Participant>) -> Self {
        Self {
            game_version: game_version.into(),
            participants,
        }
    }
}
