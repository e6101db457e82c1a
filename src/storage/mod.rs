//! Filesystem persistence.
//!
//! Handles reading and writing to the local data directory:
//! - Raw API payload cache
//! - Accumulated snapshot files (raw counts + ranked report)

mod snapshot;

pub use snapshot::*;

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt snapshot {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Cache directory for immutable API payloads.
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    /// Snapshot file for a ladder tier on a platform.
    pub fn snapshot_path(&self, tier: &str, platform: &str) -> PathBuf {
        self.data_dir
            .join(format!("top_comps_{}_{}.json", tier, platform))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}
