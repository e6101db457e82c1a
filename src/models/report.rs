//! Finalized, read-only report rows.

use serde::{Deserialize, Serialize};

use super::{ItemId, UnitId};

/// Item popularity for one unit of a composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitItemStats {
    pub character_id: UnitId,

    /// Up to three most frequent items
    pub top_items: Vec<ItemId>,

    /// (item, share of the unit's item observations), most frequent first
    pub item_freq: Vec<(ItemId, f64)>,
}

/// A finalized composition that cleared the minimum-picks threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub patch: String,
    pub comp_key: String,
    pub picks: u64,

    /// Mean placement, 2 decimals
    pub avg_placement: f64,

    /// Percentage of first places, 1 decimal
    pub winrate: f64,

    pub unit_set: Vec<UnitId>,
    pub units: Vec<UnitItemStats>,
}

impl OutputRow {
    /// Item stats for a unit in this composition.
    pub fn unit(&self, character_id: &str) -> Option<&UnitItemStats> {
        self.units.iter().find(|u| u.character_id == character_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_row_serialization_shape() {
        let row = OutputRow {
            patch: "13.24".to_string(),
            comp_key: "Jinx:1.2".to_string(),
            picks: 2,
            avg_placement: 2.0,
            winrate: 50.0,
            unit_set: vec!["Jinx".to_string()],
            units: vec![UnitItemStats {
                character_id: "Jinx".to_string(),
                top_items: vec![1, 2],
                item_freq: vec![(1, 0.5), (2, 0.5)],
            }],
        };

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["avg_placement"], 2.0);
        assert_eq!(json["units"][0]["item_freq"][0][0], 1);
        assert_eq!(json["units"][0]["item_freq"][0][1], 0.5);
        assert!(row.unit("Jinx").is_some());
        assert!(row.unit("Vi").is_none());
    }
}
