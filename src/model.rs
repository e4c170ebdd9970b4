//! Score, beatmap and performance types shared across the pipeline.

use crate::error::{PerfError, Result};
use crate::mods::ModSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// UPSTREAM PAYLOADS
// ============================================================================

/// Beatmap identity carried by a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatmapRef {
    pub id: u64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub count_300: u32,
    #[serde(default)]
    pub count_100: u32,
    #[serde(default)]
    pub count_50: u32,
    #[serde(default)]
    pub count_miss: u32,
}

/// A play as reported by the osu! API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    /// Absent for failed or unsubmitted plays
    pub id: Option<u64>,
    #[serde(default)]
    pub best_id: Option<u64>,
    pub user_id: u64,
    pub accuracy: f64,
    pub max_combo: u32,
    #[serde(default)]
    pub mods: Vec<String>,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub perfect: bool,
    #[serde(default)]
    pub pp: Option<f64>,
    #[serde(default)]
    pub rank: String,
    #[serde(default)]
    pub score: u64,
    pub created_at: DateTime<Utc>,
    pub statistics: Statistics,
    pub beatmap: BeatmapRef,
}

/// Difficulty metadata for one beatmap difficulty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatmapAttributes {
    pub id: u64,
    #[serde(rename = "accuracy")]
    pub od: f64,
    pub ar: f64,
    pub cs: f64,
    #[serde(rename = "drain")]
    pub hp: f64,
    #[serde(default)]
    pub max_combo: u32,
    #[serde(default)]
    pub total_length: u32,
    #[serde(rename = "difficulty_rating")]
    pub stars: f64,
    #[serde(default)]
    pub bpm: f64,
    pub count_circles: u32,
    pub count_sliders: u32,
    pub count_spinners: u32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "version", default)]
    pub difficulty_name: String,
    pub last_updated: DateTime<Utc>,
}

impl BeatmapAttributes {
    pub fn object_count(&self) -> u32 {
        self.count_circles + self.count_sliders + self.count_spinners
    }
}

/// A user's best score on a beatmap together with its leaderboard position.
#[derive(Debug, Clone, Deserialize)]
pub struct UserBeatmapScore {
    pub position: Option<u32>,
    pub score: LeaderboardScore,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardScore {
    pub id: u64,
}

// ============================================================================
// PIPELINE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitCounts {
    pub great: u32,
    pub ok: u32,
    pub meh: u32,
    pub miss: u32,
}

impl HitCounts {
    pub fn total(&self) -> u32 {
        self.great + self.ok + self.meh + self.miss
    }
}

impl From<Statistics> for HitCounts {
    fn from(s: Statistics) -> Self {
        Self {
            great: s.count_300,
            ok: s.count_100,
            meh: s.count_50,
            miss: s.count_miss,
        }
    }
}

/// Everything one orchestration call needs to know about a play.
#[derive(Debug, Clone)]
pub struct ScoreContext {
    pub beatmap_id: u64,
    pub accuracy: f64,
    pub max_combo: u32,
    pub mods: ModSet,
    pub hit_counts: HitCounts,
    pub object_count: u32,
    /// Beatmap maximum combo, used for the FC and SS scenarios
    pub beatmap_max_combo: u32,
}

impl ScoreContext {
    pub fn new(score: &Score, beatmap: &BeatmapAttributes) -> Result<Self> {
        let object_count = beatmap.object_count();
        if object_count == 0 {
            return Err(PerfError::invalid(format!(
                "beatmap {} has no hit objects",
                beatmap.id
            )));
        }
        if !(0.0..=1.0).contains(&score.accuracy) {
            return Err(PerfError::invalid(format!(
                "score accuracy {} outside [0, 1]",
                score.accuracy
            )));
        }
        let mods = ModSet::parse(&score.mods)?;
        mods.ensure_consistent()?;

        Ok(Self {
            beatmap_id: beatmap.id,
            accuracy: score.accuracy,
            max_combo: score.max_combo,
            mods,
            hit_counts: score.statistics.into(),
            object_count,
            beatmap_max_combo: beatmap.max_combo,
        })
    }
}

/// Backend answer for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceResult {
    pub pp: f64,
    pub star_rating: f64,
    pub accuracy: f64,
    pub combo: u32,
    pub max_combo: u32,
    pub mods: Vec<String>,
    pub hit_counts: HitCounts,
    pub ar: f64,
    pub od: f64,
    /// Display values after easing/hardening mods
    pub cs: f64,
    pub hp: f64,
    /// pp contributed by each skill (aim, speed, accuracy, flashlight)
    pub per_skill_pp: BTreeMap<String, f64>,
    pub skill_difficulty: BTreeMap<String, f64>,
    pub effective_miss_count: f64,
    /// Beatmap identity echoed by the backend
    pub beatmap: String,
}

/// Actual, if-full-combo and if-perfect results for one play.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSet {
    pub base: PerformanceResult,
    pub full_combo: PerformanceResult,
    pub perfect: PerformanceResult,
}

/// One fixed-accuracy projection.
#[derive(Debug, Clone, Serialize)]
pub struct AccuracyPoint {
    pub accuracy: f64,
    pub result: PerformanceResult,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_beatmap_attributes_from_api_json() {
        let json = r#"{
            "id": 129891,
            "accuracy": 9,
            "ar": 9.3,
            "cs": 4,
            "drain": 6,
            "max_combo": 2385,
            "total_length": 268,
            "difficulty_rating": 7.02,
            "bpm": 188,
            "count_circles": 1411,
            "count_sliders": 463,
            "count_spinners": 2,
            "status": "ranked",
            "url": "https://osu.ppy.sh/beatmaps/129891",
            "version": "FOUR DIMENSIONS",
            "last_updated": "2014-05-18T17:22:13Z"
        }"#;
        let attrs: BeatmapAttributes = serde_json::from_str(json).unwrap();
        assert_eq!(attrs.object_count(), 1876);
        assert_eq!(attrs.od, 9.0);
        assert_eq!(attrs.hp, 6.0);
        assert_eq!(attrs.difficulty_name, "FOUR DIMENSIONS");
        assert_eq!(attrs.last_updated, timestamp(1_400_433_733));
    }

    #[test]
    fn test_score_context_rejects_empty_beatmap() {
        let mut map = beatmap(1, timestamp(0));
        map.count_circles = 0;
        map.count_sliders = 0;
        map.count_spinners = 0;
        let score = score(&map);
        assert!(matches!(
            ScoreContext::new(&score, &map),
            Err(PerfError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_score_context_rejects_contradictory_mods() {
        let map = beatmap(1, timestamp(0));
        let mut score = score(&map);
        score.mods = vec!["EZ".to_string(), "HR".to_string()];
        assert!(ScoreContext::new(&score, &map).is_err());
    }

    #[test]
    fn test_score_context_from_score() {
        let map = beatmap(1, timestamp(0));
        let score = score(&map);
        let ctx = ScoreContext::new(&score, &map).unwrap();
        assert_eq!(ctx.object_count, 1000);
        assert_eq!(ctx.hit_counts.miss, 5);
        assert_eq!(ctx.hit_counts.total(), 1000);
        assert_eq!(ctx.beatmap_max_combo, 1450);
    }
}
