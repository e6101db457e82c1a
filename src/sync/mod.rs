//! Run orchestrator.
//!
//! Coordinates one accumulation run:
//! 1. Seed players from the ranked ladder
//! 2. Resolve players, list their recent matches, fetch the matches
//! 3. Count the batch into a fresh accumulator state
//! 4. Merge it exactly once into the previous snapshot and save

pub mod riot;

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::calculate::{count_matches, merge_into};
use crate::config::{AggregationConfig, RiotConfig};
use crate::fetch::FetchError;
use crate::models::MatchInfo;
use crate::storage::{load_state, write_snapshot, Snapshot, SnapshotLabels, StorageConfig};

use riot::{Division, LeagueEntry, RawMatch, Tier};

/// Errors that can occur during a run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Where matches come from. Implemented by the Riot client.
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// One page of a divisional ladder.
    async fn ladder_page(
        &self,
        tier: Tier,
        division: Division,
        page: u32,
    ) -> Result<Vec<LeagueEntry>, FetchError>;

    /// The full league list of an apex tier.
    async fn apex_ladder(&self, tier: Tier) -> Result<Vec<LeagueEntry>, FetchError>;

    async fn puuid_for_summoner(&self, summoner_id: &str) -> Result<String, FetchError>;

    async fn match_ids(&self, puuid: &str, count: u32) -> Result<Vec<String>, FetchError>;

    async fn get_match(&self, match_id: &str) -> Result<RawMatch, FetchError>;
}

/// Configuration for a run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub riot: RiotConfig,
    pub aggregation: AggregationConfig,
    pub storage: StorageConfig,
}

impl SyncConfig {
    pub fn labels(&self) -> SnapshotLabels {
        SnapshotLabels {
            platform: self.riot.platform.to_string(),
            region: self.riot.region.to_string(),
            tier: self.riot.tier.to_string(),
            division: self.riot.division.to_string(),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.storage
            .snapshot_path(self.riot.tier.as_str(), self.riot.platform.as_str())
    }
}

/// Outcome of a fan-out: successes plus how many inputs failed.
#[derive(Debug)]
pub struct FanOut<T> {
    pub ok: Vec<T>,
    pub failed: usize,
}

/// Run `op` over every input with at most `limit` in flight.
///
/// A failed input is logged and counted, never fatal.
pub async fn fan_out<T, F, Fut>(kind: &'static str, inputs: Vec<String>, limit: usize, op: F) -> FanOut<T>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();

    for input in inputs {
        let semaphore = semaphore.clone();
        let fut = op(input.clone());
        tasks.spawn(async move {
            // The semaphore is never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            (input, fut.await)
        });
    }

    let mut ok = Vec::new();
    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(value))) => ok.push(value),
            Ok((input, Err(e))) => {
                warn!("{} fetch failed for {}: {}", kind, input, e);
                failed += 1;
            }
            Err(e) => {
                error!("{} fetch task aborted: {}", kind, e);
                failed += 1;
            }
        }
    }

    FanOut { ok, failed }
}

/// Keep the first occurrence of each value.
fn dedup_preserving_order(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

/// Matches gathered for one run.
#[derive(Debug, Default)]
pub struct CollectedMatches {
    pub players: usize,
    pub match_ids: usize,
    pub matches: Vec<MatchInfo>,
    /// Payloads without a participant list
    pub skipped_matches: usize,
    pub failed_fetches: usize,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub matches_counted: usize,
    pub participants: u64,
    pub batch_compositions: usize,
    pub total_compositions: usize,
    pub total_picks: u64,
    pub rows_reported: usize,
    pub failed_fetches: usize,
    pub snapshot_path: PathBuf,
    pub duration: Duration,
}

/// Count a batch, merge it into the prior snapshot (if requested) and save.
///
/// The prior state is loaded once and the batch merged into it once.
pub fn accumulate_and_save(
    matches: &[MatchInfo],
    snapshot_path: &std::path::Path,
    labels: SnapshotLabels,
    aggregation: &AggregationConfig,
    merge_prior: bool,
) -> Result<RunSummary, SyncError> {
    let start = Instant::now();
    let run_id = Uuid::new_v4();

    info!("Aggregating {} matches (run {})", matches.len(), run_id);
    let batch = count_matches(matches);
    let participants = batch.total_picks();
    let batch_compositions = batch.len();

    let mut state = if merge_prior {
        load_state(snapshot_path)?
    } else {
        info!("Ignoring previous snapshot at {:?}", snapshot_path);
        Default::default()
    };
    merge_into(&mut state, batch);

    let snapshot = Snapshot::build(
        &state,
        labels,
        aggregation.min_picks,
        aggregation.top_n,
        run_id,
    );
    write_snapshot(snapshot_path, &snapshot)?;

    Ok(RunSummary {
        run_id,
        matches_counted: matches.len(),
        participants,
        batch_compositions,
        total_compositions: state.len(),
        total_picks: state.total_picks(),
        rows_reported: snapshot.top.len(),
        failed_fetches: 0,
        snapshot_path: snapshot_path.to_path_buf(),
        duration: start.elapsed(),
    })
}

/// Run orchestrator.
pub struct SyncOrchestrator {
    config: SyncConfig,
    source: Arc<dyn MatchSource>,
}

impl SyncOrchestrator {
    /// Create a new orchestrator.
    pub fn new(config: SyncConfig, source: Arc<dyn MatchSource>) -> Self {
        Self { config, source }
    }

    /// Seed ladder entries for the configured tier.
    async fn seed_entries(&self) -> Result<(Vec<LeagueEntry>, usize), SyncError> {
        let riot = &self.config.riot;
        info!("Seeding from {} {} on {}", riot.tier, riot.division, riot.platform);

        if riot.tier.is_apex() {
            return Ok((self.source.apex_ladder(riot.tier).await?, 0));
        }

        let mut entries = Vec::new();
        let mut failed = 0usize;
        for page in 1..=riot.ladder_pages {
            match self.source.ladder_page(riot.tier, riot.division, page).await {
                Ok(page_entries) => {
                    if page_entries.is_empty() {
                        break;
                    }
                    entries.extend(page_entries);
                }
                Err(e) => {
                    warn!("Ladder page {} failed: {}", page, e);
                    failed += 1;
                }
            }
        }
        Ok((entries, failed))
    }

    /// Resolve ladder entries to deduplicated player ids.
    async fn resolve_players(&self, mut entries: Vec<LeagueEntry>) -> FanOut<String> {
        entries.truncate(self.config.riot.seed_summoners);

        let mut puuids = Vec::new();
        let mut summoner_ids = Vec::new();
        for entry in entries {
            match (entry.puuid, entry.summoner_id) {
                (Some(puuid), _) => puuids.push(puuid),
                (None, Some(id)) => summoner_ids.push(id),
                (None, None) => {}
            }
        }

        let source = self.source.clone();
        let lookups = fan_out(
            "summoner",
            summoner_ids,
            self.config.riot.summoner_concurrency,
            move |id| {
                let source = source.clone();
                async move { source.puuid_for_summoner(&id).await }
            },
        )
        .await;

        puuids.extend(lookups.ok);
        FanOut {
            ok: dedup_preserving_order(puuids),
            failed: lookups.failed,
        }
    }

    /// Fetch ladder, players and matches. Individual fetch failures are skipped.
    pub async fn collect_matches(&self) -> Result<CollectedMatches, SyncError> {
        let riot = &self.config.riot;

        let (entries, ladder_failed) = self.seed_entries().await?;
        if entries.is_empty() {
            warn!("Ladder seed returned no players");
        }

        let players = self.resolve_players(entries).await;
        info!("Resolved {} players", players.ok.len());

        let source = self.source.clone();
        let per_player = riot.matches_per_player;
        let id_lists = fan_out(
            "match-ids",
            players.ok.clone(),
            riot.match_id_concurrency,
            move |puuid| {
                let source = source.clone();
                async move { source.match_ids(&puuid, per_player).await }
            },
        )
        .await;

        let match_ids = dedup_preserving_order(id_lists.ok.into_iter().flatten());
        info!("Found {} unique matches", match_ids.len());

        let source = self.source.clone();
        let raw = fan_out(
            "match",
            match_ids.clone(),
            riot.match_concurrency,
            move |id| {
                let source = source.clone();
                async move { source.get_match(&id).await }
            },
        )
        .await;

        let fetched = raw.ok.len();
        let matches: Vec<MatchInfo> = raw
            .ok
            .into_iter()
            .filter_map(RawMatch::into_match_info)
            .collect();
        let skipped = fetched - matches.len();
        if skipped > 0 {
            warn!("Skipped {} matches without participants", skipped);
        }

        Ok(CollectedMatches {
            players: players.ok.len(),
            match_ids: match_ids.len(),
            matches,
            skipped_matches: skipped,
            failed_fetches: ladder_failed + players.failed + id_lists.failed + raw.failed,
        })
    }

    /// Run one full accumulation: collect, count, merge, save.
    pub async fn sync_once(&self) -> Result<RunSummary, SyncError> {
        let start = Instant::now();
        let collected = self.collect_matches().await?;

        let mut summary = accumulate_and_save(
            &collected.matches,
            &self.config.snapshot_path(),
            self.config.labels(),
            &self.config.aggregation,
            true,
        )?;
        summary.failed_fetches = collected.failed_fetches;
        summary.duration = start.elapsed();

        info!(
            "Run {} completed: {} matches, {} compositions ({} reported) in {:?}",
            summary.run_id,
            summary.matches_counted,
            summary.total_compositions,
            summary.rows_reported,
            summary.duration
        );
        Ok(summary)
    }
}
