//! Difficulty-calculation backend client.
//!
//! One endpoint, `GET /performance/{beatmap_id}`, answers every scenario.
//! The scenario is expressed purely by which query parameters are sent.

use crate::error::{PerfError, Result};
use crate::mods::{DisplayParams, GameMod, ModTransform};
use crate::model::{HitCounts, PerformanceResult, ScoreContext};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Base,
    FullCombo,
    Perfect,
    Accuracy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceRequest {
    pub scenario: Scenario,
    pub beatmap_id: u64,
    pub combo: Option<u32>,
    pub mods: Vec<String>,
    pub misses: Option<u32>,
    pub goods: Option<u32>,
    pub mehs: Option<u32>,
}

impl PerformanceRequest {
    /// The play as it happened.
    pub fn base(ctx: &ScoreContext, transform: &ModTransform) -> Self {
        Self {
            scenario: Scenario::Base,
            beatmap_id: ctx.beatmap_id,
            combo: Some(ctx.max_combo),
            mods: transform.difficulty_acronyms(),
            misses: Some(ctx.hit_counts.miss),
            goods: Some(ctx.hit_counts.ok),
            mehs: Some(ctx.hit_counts.meh),
        }
    }

    /// Same play with no misses at maximum combo, using `counts` for oks/mehs.
    pub fn if_full_combo(ctx: &ScoreContext, transform: &ModTransform, counts: &HitCounts) -> Self {
        Self {
            scenario: Scenario::FullCombo,
            beatmap_id: ctx.beatmap_id,
            combo: max_combo(ctx),
            mods: transform.difficulty_acronyms(),
            misses: Some(0),
            goods: Some(counts.ok),
            mehs: Some(counts.meh),
        }
    }

    /// All greats at maximum combo.
    pub fn if_perfect(ctx: &ScoreContext, transform: &ModTransform) -> Self {
        Self {
            scenario: Scenario::Perfect,
            beatmap_id: ctx.beatmap_id,
            combo: max_combo(ctx),
            mods: transform.difficulty_acronyms(),
            misses: Some(0),
            goods: None,
            mehs: None,
        }
    }

    /// Full-combo projection for a fixed accuracy.
    pub fn at_accuracy(ctx: &ScoreContext, transform: &ModTransform, counts: &HitCounts) -> Self {
        Self {
            scenario: Scenario::Accuracy,
            ..Self::if_full_combo(ctx, transform, counts)
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(self.mods.len() + 4);
        if let Some(combo) = self.combo {
            query.push(("combo", combo.to_string()));
        }
        for m in &self.mods {
            query.push(("mod", m.clone()));
        }
        if let Some(misses) = self.misses {
            query.push(("misses", misses.to_string()));
        }
        if let Some(goods) = self.goods {
            query.push(("goods", goods.to_string()));
        }
        if let Some(mehs) = self.mehs {
            query.push(("mehs", mehs.to_string()));
        }
        query
    }
}

/// An unknown beatmap max combo lets the backend use its own.
fn max_combo(ctx: &ScoreContext) -> Option<u32> {
    (ctx.beatmap_max_combo > 0).then_some(ctx.beatmap_max_combo)
}

/// Response body of the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendPerformance {
    pub pp: f64,
    #[serde(rename = "star rating")]
    pub star_rating: f64,
    #[serde(default)]
    pub acc: f64,
    #[serde(default)]
    pub combo: u32,
    #[serde(rename = "max combo", default)]
    pub max_combo: u32,
    /// Comma separated acronyms, e.g. "HD, DT, CL"
    #[serde(default)]
    pub mods: String,
    #[serde(default)]
    pub great: u32,
    #[serde(default)]
    pub ok: u32,
    #[serde(default)]
    pub meh: u32,
    #[serde(default)]
    pub miss: u32,
    #[serde(rename = "approach rate", default)]
    pub approach_rate: f64,
    #[serde(rename = "overall difficulty", default)]
    pub overall_difficulty: f64,
    #[serde(default)]
    pub aim: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub flashlight: f64,
    #[serde(rename = "effective miss count", default)]
    pub effective_miss_count: f64,
    #[serde(rename = "aim difficulty", default)]
    pub aim_difficulty: f64,
    #[serde(rename = "speed difficulty", default)]
    pub speed_difficulty: f64,
    #[serde(rename = "speed note count", default)]
    pub speed_note_count: f64,
    #[serde(rename = "flashlight difficulty", default)]
    pub flashlight_difficulty: f64,
    #[serde(rename = "slider factor", default)]
    pub slider_factor: f64,
    #[serde(default)]
    pub beatmap: String,
}

impl BackendPerformance {
    pub fn into_result(self, display: DisplayParams) -> PerformanceResult {
        let classic = GameMod::Classic.acronym();
        let mods = self
            .mods
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty() && *m != classic)
            .map(str::to_string)
            .collect();

        let per_skill_pp = BTreeMap::from([
            ("aim".to_string(), self.aim),
            ("speed".to_string(), self.speed),
            ("accuracy".to_string(), self.accuracy),
            ("flashlight".to_string(), self.flashlight),
        ]);
        let skill_difficulty = BTreeMap::from([
            ("aim".to_string(), self.aim_difficulty),
            ("speed".to_string(), self.speed_difficulty),
            ("speed_note_count".to_string(), self.speed_note_count),
            ("flashlight".to_string(), self.flashlight_difficulty),
            ("slider_factor".to_string(), self.slider_factor),
        ]);

        PerformanceResult {
            pp: self.pp,
            star_rating: self.star_rating,
            accuracy: self.acc,
            combo: self.combo,
            max_combo: self.max_combo,
            mods,
            hit_counts: HitCounts {
                great: self.great,
                ok: self.ok,
                meh: self.meh,
                miss: self.miss,
            },
            ar: self.approach_rate,
            od: self.overall_difficulty,
            cs: display.cs,
            hp: display.hp,
            per_skill_pp,
            skill_difficulty,
            effective_miss_count: self.effective_miss_count,
            beatmap: self.beatmap,
        }
    }
}

/// "Compute performance for a beatmap given combo/mods/hit-counts".
#[async_trait]
pub trait DifficultyService: Send + Sync {
    async fn compute(&self, request: &PerformanceRequest) -> Result<BackendPerformance>;
}

/// HTTP client for the difficulty backend. Stateless apart from the
/// connection pool; share one instance by reference.
pub struct DifficultyServiceClient {
    base_url: String,
    client: Client,
}

impl DifficultyServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PerfError::Transient(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl DifficultyService for DifficultyServiceClient {
    async fn compute(&self, request: &PerformanceRequest) -> Result<BackendPerformance> {
        let url = format!("{}/performance/{}", self.base_url, request.beatmap_id);
        debug!(
            beatmap_id = request.beatmap_id,
            scenario = ?request.scenario,
            "Requesting performance"
        );

        let resp = self
            .client
            .get(&url)
            .query(&request.query())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PerfError::from_status(status, body));
        }

        resp.json::<BackendPerformance>()
            .await
            .map_err(|e| PerfError::Decode(format!("performance response: {}", e)))
    }
}
