use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comp_meta::calculate::finalize;
use comp_meta::config::{AggregationConfig, AppConfig, RiotConfig};
use comp_meta::fetch::{Fetcher, FetcherConfig};
use comp_meta::models::OutputRow;
use comp_meta::storage::{load_state, StorageConfig};
use comp_meta::sync::riot::{
    parse_match_dump, Division, Platform, Region, RiotClient, Tier, RIOT_TOKEN_HEADER,
};
use comp_meta::sync::{accumulate_and_save, RunSummary, SyncConfig, SyncOrchestrator};

#[derive(Parser)]
#[command(name = "comp-meta")]
#[command(about = "Incremental TFT composition statistics from ranked match history")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Data directory path (overrides config)
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Ladder slice overrides.
#[derive(Args, Debug, Default)]
struct LadderArgs {
    #[arg(long, env = "PLATFORM")]
    platform: Option<Platform>,

    #[arg(long, env = "REGION")]
    region: Option<Region>,

    #[arg(long, env = "TIER")]
    tier: Option<Tier>,

    /// Ignored for apex tiers
    #[arg(long, env = "DIVISION")]
    division: Option<Division>,
}

impl LadderArgs {
    fn apply(&self, riot: &mut RiotConfig) {
        if let Some(platform) = self.platform {
            riot.platform = platform;
        }
        if let Some(region) = self.region {
            riot.region = region;
        }
        if let Some(tier) = self.tier {
            riot.tier = tier;
        }
        if let Some(division) = self.division {
            riot.division = division;
        }
    }
}

/// Finalization overrides.
#[derive(Args, Debug, Default)]
struct AggregationArgs {
    /// Minimum picks for a composition to be reported
    #[arg(long, env = "MIN_PICKS")]
    min_picks: Option<u64>,

    /// Rows kept in the snapshot report
    #[arg(long)]
    top_n: Option<usize>,
}

impl AggregationArgs {
    fn apply(&self, aggregation: &mut AggregationConfig) {
        if let Some(min_picks) = self.min_picks {
            aggregation.min_picks = min_picks;
        }
        if let Some(top_n) = self.top_n {
            aggregation.top_n = top_n;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch recent ranked matches, accumulate them and write the snapshot
    Run {
        /// Riot API key
        #[arg(long, env = "RIOT_API_KEY", hide_env_values = true)]
        api_key: String,

        #[command(flatten)]
        ladder: LadderArgs,

        #[command(flatten)]
        aggregation: AggregationArgs,

        /// Ladder pages to read for non-apex tiers
        #[arg(long, env = "LADDER_PAGES")]
        ladder_pages: Option<u32>,

        /// Max ladder entries to resolve into players
        #[arg(long, env = "SEED_SUMMONERS")]
        seed_summoners: Option<usize>,

        /// Recent matches listed per player
        #[arg(long, env = "MATCHES_PER")]
        matches_per: Option<u32>,
    },

    /// Accumulate a saved JSON array of match payloads
    Aggregate {
        /// File holding a JSON array of match payloads
        #[arg(long)]
        input: PathBuf,

        /// Start from empty counts instead of the previous snapshot
        #[arg(long)]
        no_merge: bool,

        #[command(flatten)]
        ladder: LadderArgs,

        #[command(flatten)]
        aggregation: AggregationArgs,
    },

    /// Print the ranked compositions from the current snapshot
    Report {
        #[command(flatten)]
        ladder: LadderArgs,

        /// Minimum picks (overrides config)
        #[arg(long, env = "MIN_PICKS")]
        min_picks: Option<u64>,

        /// Max rows to print
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }

    // Initialize tracing
    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting comp-meta v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run {
            api_key,
            ladder,
            aggregation,
            ladder_pages,
            seed_summoners,
            matches_per,
        } => {
            if api_key.trim().is_empty() {
                bail!("RIOT_API_KEY is empty");
            }

            ladder.apply(&mut config.riot);
            aggregation.apply(&mut config.aggregation);
            if let Some(pages) = ladder_pages {
                config.riot.ladder_pages = pages;
            }
            if let Some(seed) = seed_summoners {
                config.riot.seed_summoners = seed;
            }
            if let Some(per) = matches_per {
                config.riot.matches_per_player = per;
            }
            config.validate()?;

            let storage = StorageConfig::new(config.data_dir.clone());
            let riot = &config.riot;

            let mut headers = HashMap::new();
            headers.insert(RIOT_TOKEN_HEADER.to_string(), api_key);
            let fetcher = Fetcher::new(FetcherConfig {
                cache_dir: storage.raw_dir(),
                timeout: Duration::from_secs(riot.timeout_seconds),
                default_headers: headers,
                max_retries: riot.max_retries,
                ..Default::default()
            })
            .context("Failed to create fetcher")?;

            let client = RiotClient::new(fetcher, riot.platform, riot.region, riot.cache_matches);
            let sync_config = SyncConfig {
                riot: config.riot.clone(),
                aggregation: config.aggregation.clone(),
                storage,
            };

            let orchestrator = SyncOrchestrator::new(sync_config, Arc::new(client));
            tracing::info!("Running accumulation...");
            match orchestrator.sync_once().await {
                Ok(summary) => print_summary(&summary),
                Err(e) => {
                    tracing::error!("Run failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Aggregate {
            input,
            no_merge,
            ladder,
            aggregation,
        } => {
            ladder.apply(&mut config.riot);
            aggregation.apply(&mut config.aggregation);
            config.validate()?;

            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {:?}", input))?;
            let (matches, skipped) = parse_match_dump(&text)
                .with_context(|| format!("{:?} is not a JSON array of matches", input))?;
            if skipped > 0 {
                tracing::warn!("Skipped {} unusable match payloads in {:?}", skipped, input);
            }

            let sync_config = SyncConfig {
                riot: config.riot.clone(),
                aggregation: config.aggregation.clone(),
                storage: StorageConfig::new(config.data_dir.clone()),
            };

            let summary = accumulate_and_save(
                &matches,
                &sync_config.snapshot_path(),
                sync_config.labels(),
                &sync_config.aggregation,
                !no_merge,
            )?;
            print_summary(&summary);
        }
        Commands::Report {
            ladder,
            min_picks,
            limit,
            json,
        } => {
            ladder.apply(&mut config.riot);
            let min_picks = min_picks.unwrap_or(config.aggregation.min_picks);

            let storage = StorageConfig::new(config.data_dir.clone());
            let path = storage.snapshot_path(config.riot.tier.as_str(), config.riot.platform.as_str());
            let state = load_state(&path)?;

            let mut rows = finalize(&state, min_picks);
            rows.truncate(limit);

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_rows(&rows, &config.riot, min_picks);
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\n=== Run Results ===");
    println!("Run:              {}", summary.run_id);
    println!("Matches counted:  {}", summary.matches_counted);
    println!("Participants:     {}", summary.participants);
    println!("New compositions: {}", summary.batch_compositions);
    println!("Total comps:      {}", summary.total_compositions);
    println!("Total picks:      {}", summary.total_picks);
    println!("Rows reported:    {}", summary.rows_reported);
    println!("Failed fetches:   {}", summary.failed_fetches);
    println!("Snapshot:         {:?}", summary.snapshot_path);
    println!("Duration:         {:?}", summary.duration);
}

fn print_rows(rows: &[OutputRow], riot: &RiotConfig, min_picks: u64) {
    println!(
        "=== Top Compositions ({} {}, min picks {}) ===\n",
        riot.tier, riot.platform, min_picks
    );
    if rows.is_empty() {
        println!("No compositions reach the pick threshold.");
        return;
    }

    for (rank, row) in rows.iter().enumerate() {
        println!(
            "{:>3}. [{}] avg {:.2}  win {:.1}%  picks {}",
            rank + 1,
            row.patch,
            row.avg_placement,
            row.winrate,
            row.picks
        );
        for unit in &row.units {
            let items: Vec<String> = unit.top_items.iter().map(|i| i.to_string()).collect();
            println!("       {:<24} {}", unit.character_id, items.join(", "));
        }
    }
}
