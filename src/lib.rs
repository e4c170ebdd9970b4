//! Score performance analysis for osu! standard
//!
//! Turns a submitted (or failed) play into actual, if-full-combo, if-perfect
//! and fixed-accuracy pp values, backed by a local cache of beatmap metadata
//! and leaderboard positions.
//!
//! ## Module Structure
//!
//! - `mods`: mod parsing and display-stat transforms
//! - `accuracy`: hit-count reconstruction from an accuracy
//! - `difficulty`: difficulty-calculation backend client
//! - `osu_api`: upstream beatmap/score provider
//! - `storage`: SQLite cache tables
//! - `beatmap_cache` / `position_cache`: cache-aside lookups
//! - `orchestrator`: per-score fan-out

/// Error taxonomy shared by every module
pub mod error;

/// Runtime configuration (env and TOML)
pub mod config;

/// Bounded retry with exponential backoff
pub mod retry;

/// Upstream payloads and pipeline value types
pub mod model;

pub mod mods;

pub mod accuracy;

/// Difficulty backend client
pub mod difficulty;

/// osu! API v2 client
pub mod osu_api;

/// Local persistence for cached metadata and positions
pub mod storage;

pub mod beatmap_cache;

pub mod position_cache;

/// Parallel performance computation per score
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use beatmap_cache::{BeatmapDifficultyRecord, BeatmapMetadataCache};
pub use config::PerfConfig;
pub use difficulty::{DifficultyService, DifficultyServiceClient, PerformanceRequest, Scenario};
pub use error::{PerfError, Result};
pub use model::{
    AccuracyPoint, BeatmapAttributes, HitCounts, PerformanceResult, PerformanceSet, Score,
    ScoreContext,
};
pub use mods::{DisplayParams, GameMod, ModSet, ModTransform};
pub use orchestrator::{PerformanceOrchestrator, ScoreAnalysis};
pub use osu_api::{OsuApiClient, OsuProvider, ScoreKind};
pub use position_cache::ScorePositionCache;
pub use storage::CacheStore;
