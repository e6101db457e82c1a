//! Snapshot files.
//!
//! A snapshot carries the full raw counts (for exact accumulation on the
//! next run) alongside the top ranked rows and run metadata.

use std::collections::btree_map::Entry;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::StorageError;
use crate::calculate::{finalize_top, merge_entry};
use crate::models::{AccumulatorEntry, AccumulatorState, ItemId, OutputRow, UnitId};

/// Persisted form of one accumulator entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCountRow {
    pub patch: String,
    pub comp_key: String,
    pub picks: u64,
    pub wins: u64,
    #[serde(alias = "sumPlacement")]
    pub placement_sum: u64,
    pub unit_set: Vec<UnitId>,
    /// (unit id, [(item id, count)])
    #[serde(default)]
    pub units: Vec<(UnitId, Vec<(ItemId, u64)>)>,
}

impl From<&AccumulatorEntry> for RawCountRow {
    fn from(entry: &AccumulatorEntry) -> Self {
        Self {
            patch: entry.patch.clone(),
            comp_key: entry.comp_key.clone(),
            picks: entry.picks,
            wins: entry.wins,
            placement_sum: entry.placement_sum,
            unit_set: entry.unit_set.clone(),
            units: entry
                .item_histogram
                .iter()
                .map(|(unit, counts)| {
                    (
                        unit.clone(),
                        counts.iter().map(|(&item, &count)| (item, count)).collect(),
                    )
                })
                .collect(),
        }
    }
}

impl From<RawCountRow> for AccumulatorEntry {
    fn from(row: RawCountRow) -> Self {
        let mut entry = AccumulatorEntry::new(row.patch, row.comp_key, row.unit_set);
        entry.picks = row.picks;
        entry.wins = row.wins;
        entry.placement_sum = row.placement_sum;
        for (unit, counts) in row.units {
            let histogram = entry.unit_histogram_mut(&unit);
            for (item, count) in counts {
                *histogram.entry(item).or_insert(0) += count;
            }
        }
        entry
    }
}

/// Labels describing which ladder slice a snapshot covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLabels {
    pub platform: String,
    pub region: String,
    pub tier: String,
    pub division: String,
}

/// A complete snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub run_id: Uuid,
    #[serde(flatten)]
    pub labels: SnapshotLabels,
    pub min_picks: u64,
    pub top: Vec<OutputRow>,
    pub raw_counts: Vec<RawCountRow>,
}

impl Snapshot {
    /// Build a snapshot from the merged state, finalizing the top rows.
    pub fn build(
        state: &AccumulatorState,
        labels: SnapshotLabels,
        min_picks: u64,
        top_n: usize,
        run_id: Uuid,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            run_id,
            labels,
            min_picks,
            top: finalize_top(state, min_picks, top_n),
            raw_counts: state.iter().map(RawCountRow::from).collect(),
        }
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> StorageError {
    StorageError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Rebuild an accumulator state from snapshot JSON text.
///
/// Rows that fail to parse or break the count invariants are skipped.
/// Rows repeating an identity are combined.
pub fn parse_state(path: &Path, text: &str) -> Result<AccumulatorState, StorageError> {
    let doc: Value = serde_json::from_str(text).map_err(|e| corrupt(path, e.to_string()))?;
    let obj = doc
        .as_object()
        .ok_or_else(|| corrupt(path, "top-level value is not an object"))?;

    let rows = obj
        .get("raw_counts")
        .or_else(|| obj.get("__raw_counts"))
        .and_then(Value::as_array)
        .ok_or_else(|| corrupt(path, "missing raw_counts list"))?;

    let mut state = AccumulatorState::new();
    let mut skipped = 0usize;

    for (idx, row) in rows.iter().enumerate() {
        let row: RawCountRow = match serde_json::from_value(row.clone()) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping raw count row {} in {:?}: {}", idx, path, e);
                skipped += 1;
                continue;
            }
        };

        let entry = AccumulatorEntry::from(row);
        if !entry.is_consistent() {
            warn!(
                "Skipping inconsistent raw count row {} ({}) in {:?}",
                idx,
                entry.id(),
                path
            );
            skipped += 1;
            continue;
        }

        match state.entry(entry.id()) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(mut slot) => merge_entry(slot.get_mut(), &entry),
        }
    }

    debug!(
        "Parsed {} compositions from {:?} ({} rows skipped)",
        state.len(),
        path,
        skipped
    );
    Ok(state)
}

/// Load the accumulated state from a snapshot file.
///
/// A missing or unreadable file is an empty state. A file that is not a
/// snapshot at all (including non UTF-8 bytes) is an error, so it is never
/// overwritten with partial counts.
pub fn load_state(path: &Path) -> Result<AccumulatorState, StorageError> {
    if !path.exists() {
        info!("No previous snapshot at {:?}, starting fresh", path);
        return Ok(AccumulatorState::new());
    }

    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!("Could not read snapshot {:?}, starting fresh: {}", path, e);
            return Ok(AccumulatorState::new());
        }
    };
    let text = String::from_utf8(bytes).map_err(|e| corrupt(path, e.to_string()))?;

    let state = parse_state(path, &text)?;
    info!(
        "Loaded {} compositions ({} picks) from {:?}",
        state.len(),
        state.total_picks(),
        path
    );
    Ok(state)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a snapshot, replacing any existing file atomically.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    {
        let file = fs::File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshot)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;

    info!(
        "Wrote snapshot with {} compositions ({} reported) to {:?}",
        snapshot.raw_counts.len(),
        snapshot.top.len(),
        path
    );
    Ok(())
}
