//! Composition signatures and patch normalization.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Unit, UnitId};

/// Separates per-unit tokens in a composition key.
pub const TOKEN_SEPARATOR: char = '|';

/// Separates a unit id from its item list inside a token.
pub const ITEM_SEGMENT_SEPARATOR: char = ':';

/// Separates items inside a token.
pub const ITEM_SEPARATOR: char = '.';

/// Reduce a raw game version to `major.minor`.
///
/// Takes the first `<digits>.<digits>` run, so
/// `"Version 13.24.550.1234 (Dec 01 2023/10:12:33) [PUBLIC]"` becomes `"13.24"`.
/// Strings without such a run are returned unchanged.
pub fn normalize_patch(game_version: &str) -> String {
    static PATCH_RE: OnceLock<Regex> = OnceLock::new();
    let re = PATCH_RE.get_or_init(|| Regex::new(r"(\d+)\.(\d+)").expect("valid patch regex"));

    match re.captures(game_version) {
        Some(caps) => format!("{}.{}", &caps[1], &caps[2]),
        None => game_version.to_string(),
    }
}

/// Escapes separator characters inside a unit id.
pub const ESCAPE: char = '\\';

/// Backslash-escape separators (and the escape itself) in a unit id, so a
/// key always splits back into the tokens it was built from.
fn escape_unit_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        if matches!(c, ESCAPE | TOKEN_SEPARATOR | ITEM_SEGMENT_SEPARATOR | ITEM_SEPARATOR) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Render one unit as `id:item1.item2`, items ascending.
///
/// An itemless unit renders with an empty item segment (`id:`).
fn unit_token(unit: &Unit) -> String {
    let mut items = unit.items.clone();
    items.sort_unstable();

    let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    format!(
        "{}{}{}",
        escape_unit_id(&unit.character_id),
        ITEM_SEGMENT_SEPARATOR,
        items.join(&ITEM_SEPARATOR.to_string())
    )
}

/// Canonical key for a team, independent of unit and item order.
///
/// Item loadouts are part of the key, so the same unit with a different
/// build is a different composition.
pub fn composition_key(units: &[Unit]) -> String {
    let mut tokens: Vec<String> = units.iter().map(unit_token).collect();
    tokens.sort();
    tokens.join(&TOKEN_SEPARATOR.to_string())
}

/// Sorted, deduplicated unit identifiers of a team.
pub fn unit_set(units: &[Unit]) -> Vec<UnitId> {
    let mut ids: Vec<UnitId> = units.iter().map(|u| u.character_id.clone()).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Derive both the composition key and the unit set for a team.
pub fn derive_signature(units: &[Unit]) -> (String, Vec<UnitId>) {
    (composition_key(units), unit_set(units))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, items: &[i64]) -> Unit {
        Unit::new(id, items.to_vec())
    }

    #[test]
    fn test_normalize_patch_full_version_string() {
        assert_eq!(
            normalize_patch("Version 13.24.550.1234 (Dec 01 2023/10:12:33) [PUBLIC]"),
            "13.24"
        );
    }

    #[test]
    fn test_normalize_patch_bare() {
        assert_eq!(normalize_patch("13.24.1"), "13.24");
        assert_eq!(normalize_patch("14.1"), "14.1");
    }

    #[test]
    fn test_normalize_patch_no_version_kept() {
        assert_eq!(normalize_patch("unknown"), "unknown");
        assert_eq!(normalize_patch(""), "");
    }

    #[test]
    fn test_composition_key_format() {
        let key = composition_key(&[unit("Vi", &[44, 3]), unit("Jinx", &[2, 1])]);
        assert_eq!(key, "Jinx:1.2|Vi:3.44");
    }

    #[test]
    fn test_items_sorted_numerically() {
        // 10 sorts after 9 numerically, before it lexically
        let key = composition_key(&[unit("Jinx", &[10, 9])]);
        assert_eq!(key, "Jinx:9.10");
    }

    #[test]
    fn test_composition_key_order_invariant() {
        let a = composition_key(&[unit("Jinx", &[1, 2]), unit("Vi", &[3])]);
        let b = composition_key(&[unit("Vi", &[3]), unit("Jinx", &[2, 1])]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_item_fork_is_distinct() {
        let ad = composition_key(&[unit("Jinx", &[1, 1, 2])]);
        let ap = composition_key(&[unit("Jinx", &[1, 2, 2])]);
        assert_ne!(ad, ap);
    }

    #[test]
    fn test_itemless_unit_participates() {
        let with_empty = composition_key(&[unit("Jinx", &[1]), unit("Vi", &[])]);
        let without = composition_key(&[unit("Jinx", &[1])]);
        assert_eq!(with_empty, "Jinx:1|Vi:");
        assert_ne!(with_empty, without);
    }

    #[test]
    fn test_duplicate_units_kept_in_key_but_deduped_in_set() {
        let units = [unit("Jinx", &[1]), unit("Jinx", &[2])];
        let (key, set) = derive_signature(&units);
        assert_eq!(key, "Jinx:1|Jinx:2");
        assert_eq!(set, vec!["Jinx".to_string()]);
    }

    #[test]
    fn test_separators_in_unit_id_are_escaped() {
        let smuggled = composition_key(&[unit("A:1|B", &[])]);
        let honest = composition_key(&[unit("A", &[1]), unit("B", &[])]);
        assert_eq!(honest, "A:1|B:");
        assert_eq!(smuggled, r"A\:1\|B:");
        assert_ne!(smuggled, honest);

        assert_ne!(
            composition_key(&[unit("A.1", &[])]),
            composition_key(&[unit("A", &[]), unit("1", &[])])
        );
        assert_eq!(composition_key(&[unit(r"A\", &[])]), r"A\\:");
    }

    #[test]
    fn test_empty_team() {
        let (key, set) = derive_signature(&[]);
        assert_eq!(key, "");
        assert!(set.is_empty());
    }
}
