//! osu-perf
//!
//! Analyzes a user's plays against the difficulty backend and prints the
//! results as JSON.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use osu_perf::{
    BeatmapMetadataCache, CacheStore, DifficultyServiceClient, OsuApiClient, OsuProvider,
    PerfConfig, PerformanceOrchestrator, ScoreKind, ScorePositionCache,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "osu-perf")]
#[command(about = "Score performance analysis for osu! standard")]
struct Args {
    /// TOML config file; environment variables override its values
    #[arg(short, long, env = "OSU_PERF_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze the user's most recent play
    Recent {
        #[arg(short, long)]
        user: u64,

        /// Include the fixed-accuracy projections
        #[arg(long)]
        curve: bool,
    },
    /// Analyze the user's top plays
    Best {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long, default_value = "5")]
        limit: u32,
    },
    /// Resolve the local `.osu` file for a beatmap version
    BeatmapFile {
        #[arg(short, long)]
        beatmap: u64,

        /// Upstream last-updated timestamp (RFC 3339)
        #[arg(long)]
        last_updated: DateTime<Utc>,
    },
}

struct Pipeline {
    provider: Arc<OsuApiClient>,
    beatmaps: Arc<BeatmapMetadataCache>,
    orchestrator: PerformanceOrchestrator,
}

fn build(config: &PerfConfig) -> Result<Pipeline> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::create_dir_all(&config.beatmap_file_dir)
        .with_context(|| format!("creating {}", config.beatmap_file_dir.display()))?;

    let store = Arc::new(
        CacheStore::open(&config.database_path)
            .with_context(|| format!("opening {}", config.database_path.display()))?,
    );
    let provider = Arc::new(OsuApiClient::new(config)?);
    let difficulty = Arc::new(DifficultyServiceClient::new(
        &config.difficulty_api_base,
        Duration::from_secs(config.request_timeout_secs),
    )?);

    let beatmaps = Arc::new(BeatmapMetadataCache::new(
        store.clone(),
        provider.clone(),
        config.beatmap_file_dir.clone(),
    ));
    let positions = Arc::new(ScorePositionCache::new(store, provider.clone()));
    let orchestrator = PerformanceOrchestrator::new(
        beatmaps.clone(),
        positions,
        difficulty,
        config.max_concurrent_requests,
        config.accuracy_thresholds.clone(),
    );

    Ok(Pipeline {
        provider,
        beatmaps,
        orchestrator,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("osu_perf=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PerfConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PerfConfig::from_env(),
    };
    config.validate()?;

    info!("Difficulty backend: {}", config.difficulty_api_base);
    info!("Cache database: {}", config.database_path.display());

    let pipeline = build(&config)?;

    match args.command {
        Command::Recent { user, curve } => {
            let scores = pipeline
                .provider
                .user_scores(user, ScoreKind::Recent, 1)
                .await
                .context("fetching recent scores")?;
            let Some(score) = scores.first() else {
                println!("No recent plays found for user {}", user);
                return Ok(());
            };
            let analysis = pipeline.orchestrator.analyze(score, curve).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Command::Best { user, limit } => {
            let scores = pipeline
                .provider
                .user_scores(user, ScoreKind::Best, limit)
                .await
                .context("fetching top scores")?;
            if scores.is_empty() {
                println!("No top plays found for user {}", user);
                return Ok(());
            }
            let analyses = pipeline.orchestrator.analyze_many(&scores, false).await?;
            println!("{}", serde_json::to_string_pretty(&analyses)?);
        }
        Command::BeatmapFile {
            beatmap,
            last_updated,
        } => {
            pipeline
                .beatmaps
                .resolve_file(beatmap, last_updated)
                .await
                .with_context(|| format!("resolving beatmap file {}", beatmap))?;
            println!(
                "{}",
                pipeline.beatmaps.file_path(beatmap, last_updated).display()
            );
        }
    }

    Ok(())
}
