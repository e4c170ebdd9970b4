//! Performance Orchestrator
//!
//! Resolves beatmap metadata for a score, derives the per-scenario backend
//! requests and fans them out in parallel.
//!
//! ```text
//!  Score ──► BeatmapMetadataCache ──► ScoreContext + ModTransform
//!                                            │
//!            ┌───────────────┬───────────────┼─────────────────┐
//!            ▼               ▼               ▼                 ▼
//!          base       if-full-combo     if-perfect     accuracy points
//!            └───────────────┴──── DifficultyService ──────────┘
//! ```
//!
//! Fan-outs are all-or-nothing: the first failure is returned and partial
//! results are discarded. Sub-requests run as spawned tasks, so they finish
//! even if the caller stops waiting.

use crate::accuracy;
use crate::beatmap_cache::{BeatmapDifficultyRecord, BeatmapMetadataCache};
use crate::difficulty::{DifficultyService, PerformanceRequest};
use crate::error::{PerfError, Result};
use crate::model::{
    AccuracyPoint, BeatmapAttributes, PerformanceResult, PerformanceSet, Score, ScoreContext,
};
use crate::mods::{DisplayParams, ModTransform};
use crate::position_cache::ScorePositionCache;
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Everything the message layer needs to render one play.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreAnalysis {
    pub beatmap: BeatmapAttributes,
    pub position: Option<u32>,
    pub display: DisplayParams,
    pub performance: PerformanceSet,
    pub accuracy_curve: Option<Vec<AccuracyPoint>>,
}

struct Prepared {
    record: BeatmapDifficultyRecord,
    ctx: ScoreContext,
    transform: ModTransform,
}

pub struct PerformanceOrchestrator {
    beatmaps: Arc<BeatmapMetadataCache>,
    positions: Arc<ScorePositionCache>,
    difficulty: Arc<dyn DifficultyService>,
    max_concurrency: usize,
    thresholds: Vec<f64>,
}

impl PerformanceOrchestrator {
    pub fn new(
        beatmaps: Arc<BeatmapMetadataCache>,
        positions: Arc<ScorePositionCache>,
        difficulty: Arc<dyn DifficultyService>,
        max_concurrency: usize,
        thresholds: Vec<f64>,
    ) -> Self {
        Self {
            beatmaps,
            positions,
            difficulty,
            max_concurrency: max_concurrency.max(1),
            thresholds,
        }
    }

    async fn prepare(&self, score: &Score) -> Result<Prepared> {
        let record = self
            .beatmaps
            .resolve(score.beatmap.id, score.beatmap.last_updated)
            .await?;
        let ctx = ScoreContext::new(score, &record.attributes)?;
        let transform = ModTransform::apply(&ctx.mods, record.attributes.cs, record.attributes.hp);
        Ok(Prepared {
            record,
            ctx,
            transform,
        })
    }

    /// Actual, if-full-combo and if-perfect pp for a play.
    pub async fn compute_actual(&self, score: &Score) -> Result<PerformanceSet> {
        let prepared = self.prepare(score).await?;
        self.actual_for(&prepared.ctx, &prepared.transform).await
    }

    /// Full-combo projections at each accuracy in `thresholds`, in input order.
    pub async fn compute_accuracy_curve(
        &self,
        score: &Score,
        thresholds: &[f64],
    ) -> Result<Vec<AccuracyPoint>> {
        let prepared = self.prepare(score).await?;
        self.curve_for(&prepared.ctx, &prepared.transform, thresholds)
            .await
    }

    /// Beatmap metadata, leaderboard position and pp for a play; with
    /// `with_curve`, also the configured accuracy projections.
    pub async fn analyze(&self, score: &Score, with_curve: bool) -> Result<ScoreAnalysis> {
        let Prepared {
            record,
            ctx,
            transform,
        } = self.prepare(score).await?;

        let position = self
            .positions
            .resolve(score.id, score.user_id, score.beatmap.id);
        let actual = self.actual_for(&ctx, &transform);
        let curve = async {
            if with_curve {
                self.curve_for(&ctx, &transform, &self.thresholds)
                    .await
                    .map(Some)
            } else {
                Ok(None)
            }
        };

        let (position, performance, accuracy_curve) = tokio::try_join!(position, actual, curve)?;

        Ok(ScoreAnalysis {
            beatmap: record.attributes,
            position,
            display: transform.display,
            performance,
            accuracy_curve,
        })
    }

    /// `analyze` for several plays at once. Results keep the order of
    /// `scores`; any failure fails the batch.
    pub async fn analyze_many(
        &self,
        scores: &[Score],
        with_curve: bool,
    ) -> Result<Vec<ScoreAnalysis>> {
        try_join_all(scores.iter().map(|score| self.analyze(score, with_curve))).await
    }

    async fn actual_for(&self, ctx: &ScoreContext, transform: &ModTransform) -> Result<PerformanceSet> {
        let fc_counts = accuracy::reconstruct(ctx.accuracy, ctx.object_count, ctx.hit_counts.miss)?;
        let requests = vec![
            PerformanceRequest::base(ctx, transform),
            PerformanceRequest::if_full_combo(ctx, transform, &fc_counts),
            PerformanceRequest::if_perfect(ctx, transform),
        ];

        let mut results = self.fan_out(requests, transform.display).await?.into_iter();
        let (Some(base), Some(full_combo), Some(perfect)) =
            (results.next(), results.next(), results.next())
        else {
            return Err(PerfError::Transient(
                "difficulty fan-out returned fewer results than requests".to_string(),
            ));
        };

        info!(
            beatmap_id = ctx.beatmap_id,
            "pp: actual {:.2}, fc {:.2}, ss {:.2}",
            base.pp,
            full_combo.pp,
            perfect.pp
        );
        Ok(PerformanceSet {
            base,
            full_combo,
            perfect,
        })
    }

    async fn curve_for(
        &self,
        ctx: &ScoreContext,
        transform: &ModTransform,
        thresholds: &[f64],
    ) -> Result<Vec<AccuracyPoint>> {
        let requests = thresholds
            .iter()
            .map(|&t| {
                let counts = accuracy::threshold_counts(t, ctx.object_count)?;
                Ok(PerformanceRequest::at_accuracy(ctx, transform, &counts))
            })
            .collect::<Result<Vec<_>>>()?;

        let results = self.fan_out(requests, transform.display).await?;
        Ok(thresholds
            .iter()
            .zip(results)
            .map(|(&accuracy, result)| AccuracyPoint { accuracy, result })
            .collect())
    }

    /// Run requests concurrently, at most `max_concurrency` at a time.
    /// Results are in request order.
    async fn fan_out(
        &self,
        requests: Vec<PerformanceRequest>,
        display: DisplayParams,
    ) -> Result<Vec<PerformanceResult>> {
        debug!("Dispatching {} performance requests", requests.len());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let handles = requests.into_iter().map(|request| {
            let service = Arc::clone(&self.difficulty);
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PerfError::Transient(format!("fan-out closed: {}", e)))?;
                service.compute(&request).await
            })
        });

        try_join_all(handles.map(|handle| async move {
            let raw = handle
                .await
                .map_err(|e| PerfError::Transient(format!("performance task failed: {}", e)))??;
            Ok::<_, PerfError>(raw.into_result(display))
        }))
        .await
    }
}
