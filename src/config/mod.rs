//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::sync::riot::{Division, Platform, Region, Tier};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Ladder slice and fetch limits for the match API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiotConfig {
    #[serde(default = "default_platform")]
    pub platform: Platform,

    #[serde(default = "default_region")]
    pub region: Region,

    #[serde(default = "default_tier")]
    pub tier: Tier,

    /// Ignored for apex tiers
    #[serde(default = "default_division")]
    pub division: Division,

    /// Ladder pages to read for non-apex tiers
    #[serde(default = "default_ladder_pages")]
    pub ladder_pages: u32,

    /// Max ladder entries to resolve into players
    #[serde(default = "default_seed_summoners")]
    pub seed_summoners: usize,

    /// Recent matches listed per player
    #[serde(default = "default_matches_per_player")]
    pub matches_per_player: u32,

    #[serde(default = "default_summoner_concurrency")]
    pub summoner_concurrency: usize,

    #[serde(default = "default_match_id_concurrency")]
    pub match_id_concurrency: usize,

    #[serde(default = "default_match_concurrency")]
    pub match_concurrency: usize,

    /// Timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Retries after HTTP 429
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Cache finished match payloads on disk
    #[serde(default = "default_cache_matches")]
    pub cache_matches: bool,
}

fn default_platform() -> Platform {
    Platform::Na1
}

fn default_region() -> Region {
    Region::Americas
}

fn default_tier() -> Tier {
    Tier::Master
}

fn default_division() -> Division {
    Division::I
}

fn default_ladder_pages() -> u32 {
    5
}

fn default_seed_summoners() -> usize {
    1000
}

fn default_matches_per_player() -> u32 {
    20
}

fn default_summoner_concurrency() -> usize {
    12
}

fn default_match_id_concurrency() -> usize {
    12
}

fn default_match_concurrency() -> usize {
    8
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_cache_matches() -> bool {
    true
}

impl Default for RiotConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            region: default_region(),
            tier: default_tier(),
            division: default_division(),
            ladder_pages: default_ladder_pages(),
            seed_summoners: default_seed_summoners(),
            matches_per_player: default_matches_per_player(),
            summoner_concurrency: default_summoner_concurrency(),
            match_id_concurrency: default_match_id_concurrency(),
            match_concurrency: default_match_concurrency(),
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            cache_matches: default_cache_matches(),
        }
    }
}

/// Finalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Compositions with fewer picks are left out of the report
    #[serde(default = "default_min_picks")]
    pub min_picks: u64,

    /// Rows kept in the snapshot's report section
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_min_picks() -> u64 {
    50
}

fn default_top_n() -> usize {
    20
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_picks: default_min_picks(),
            top_n: default_top_n(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub riot: RiotConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            riot: RiotConfig::default(),
            aggregation: AggregationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            info!("Loading config from {:?}", path);
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let riot = &self.riot;

        if riot.summoner_concurrency == 0
            || riot.match_id_concurrency == 0
            || riot.match_concurrency == 0
        {
            return Err(ConfigError::ValidationError(
                "Concurrency limits must be greater than 0".to_string(),
            ));
        }

        if riot.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if riot.matches_per_player == 0 {
            return Err(ConfigError::ValidationError(
                "matches_per_player must be greater than 0".to_string(),
            ));
        }

        if !riot.tier.is_apex() && riot.ladder_pages == 0 {
            return Err(ConfigError::ValidationError(format!(
                "ladder_pages must be greater than 0 for tier {}",
                riot.tier
            )));
        }

        if self.aggregation.top_n == 0 {
            return Err(ConfigError::ValidationError(
                "top_n must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
