//! In-process fakes for the upstream provider.

use crate::error::{PerfError, Result};
use crate::model::{BeatmapAttributes, LeaderboardScore, Score, UserBeatmapScore};
use crate::osu_api::{OsuProvider, ScoreKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
pub struct FakeProvider {
    pub beatmaps: Mutex<HashMap<u64, BeatmapAttributes>>,
    pub files: Mutex<HashMap<u64, String>>,
    pub leaderboard: Mutex<HashMap<(u64, u64), (Option<u32>, u64)>>,
    pub scores: Mutex<Vec<Score>>,
    pub beatmap_calls: AtomicUsize,
    pub file_calls: AtomicUsize,
    pub leaderboard_calls: AtomicUsize,
    pub unavailable: AtomicBool,
}

impl FakeProvider {
    /// Provider serving `attrs` and a minimal `.osu` file for the same id.
    pub fn with_beatmap(attrs: BeatmapAttributes) -> Self {
        let provider = Self::default();
        provider
            .files
            .lock()
            .insert(attrs.id, format!("osu file format v14\n// beatmap {}", attrs.id));
        provider.beatmaps.lock().insert(attrs.id, attrs);
        provider
    }

    pub fn set_leaderboard(&self, beatmap_id: u64, user_id: u64, position: Option<u32>, score_id: u64) {
        self.leaderboard
            .lock()
            .insert((beatmap_id, user_id), (position, score_id));
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PerfError::Transient("provider unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OsuProvider for FakeProvider {
    async fn beatmap(&self, beatmap_id: u64) -> Result<BeatmapAttributes> {
        self.beatmap_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.beatmaps
            .lock()
            .get(&beatmap_id)
            .cloned()
            .ok_or_else(|| PerfError::Upstream {
                status: 404,
                message: format!("beatmap {} not found", beatmap_id),
            })
    }

    async fn beatmap_file(&self, beatmap_id: u64) -> Result<String> {
        self.file_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.files
            .lock()
            .get(&beatmap_id)
            .cloned()
            .ok_or_else(|| PerfError::Decode(format!("empty beatmap file for {}", beatmap_id)))
    }

    async fn user_beatmap_score(
        &self,
        beatmap_id: u64,
        user_id: u64,
    ) -> Result<Option<UserBeatmapScore>> {
        self.leaderboard_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self
            .leaderboard
            .lock()
            .get(&(beatmap_id, user_id))
            .map(|&(position, id)| UserBeatmapScore {
                position,
                score: LeaderboardScore { id },
            }))
    }

    async fn user_scores(&self, user_id: u64, _kind: ScoreKind, limit: u32) -> Result<Vec<Score>> {
        self.check_available()?;
        Ok(self
            .scores
            .lock()
            .iter()
            .filter(|s| s.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
