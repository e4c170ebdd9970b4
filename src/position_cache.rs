//! Score Position Cache
//!
//! Leaderboard positions by score id. A position is cached only once the
//! upstream confirms that the score is still the user's top score on the
//! beatmap. Cached positions are not re-validated afterwards.

use crate::error::Result;
use crate::osu_api::OsuProvider;
use crate::storage::PositionStore;
use std::sync::Arc;
use tracing::debug;

pub struct ScorePositionCache {
    store: Arc<dyn PositionStore>,
    provider: Arc<dyn OsuProvider>,
}

impl ScorePositionCache {
    pub fn new(store: Arc<dyn PositionStore>, provider: Arc<dyn OsuProvider>) -> Self {
        Self { store, provider }
    }

    /// Position of `score_id` on the beatmap leaderboard, if known.
    ///
    /// Unsubmitted plays (`score_id == None`) resolve to `None` without any
    /// external call. A superseded score also resolves to `None` and is not
    /// cached.
    pub async fn resolve(
        &self,
        score_id: Option<u64>,
        user_id: u64,
        beatmap_id: u64,
    ) -> Result<Option<u32>> {
        let Some(score_id) = score_id else {
            return Ok(None);
        };

        if let Some(position) = self.store.get_position(score_id)? {
            debug!(score_id, position, "Score position cache hit");
            return Ok(Some(position));
        }

        let Some(entry) = self.provider.user_beatmap_score(beatmap_id, user_id).await? else {
            debug!(score_id, user_id, beatmap_id, "User has no leaderboard score");
            return Ok(None);
        };

        if entry.score.id != score_id {
            debug!(
                score_id,
                upstream_score_id = entry.score.id,
                "Score superseded on leaderboard, position unknown"
            );
            return Ok(None);
        }

        if let Some(position) = entry.position {
            self.store.put_position(score_id, position)?;
        }
        Ok(entry.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CacheStore;
    use crate::testing::FakeProvider;
    use std::sync::atomic::Ordering;

    fn setup() -> (Arc<FakeProvider>, Arc<CacheStore>, ScorePositionCache) {
        let provider = Arc::new(FakeProvider::default());
        let store = Arc::new(CacheStore::in_memory().unwrap());
        let cache = ScorePositionCache::new(store.clone(), provider.clone());
        (provider, store, cache)
    }

    #[tokio::test]
    async fn test_unsubmitted_score_makes_no_calls() {
        let (provider, _, cache) = setup();
        assert_eq!(cache.resolve(None, 1, 2).await.unwrap(), None);
        assert_eq!(provider.leaderboard_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_matching_score_is_cached() {
        let (provider, store, cache) = setup();
        provider.set_leaderboard(2, 1, Some(17), 900);

        assert_eq!(cache.resolve(Some(900), 1, 2).await.unwrap(), Some(17));
        assert_eq!(store.get_position(900).unwrap(), Some(17));

        // Served from cache even after the upstream moves on
        provider.set_leaderboard(2, 1, Some(3), 901);
        assert_eq!(cache.resolve(Some(900), 1, 2).await.unwrap(), Some(17));
        assert_eq!(provider.leaderboard_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_superseded_score_is_not_cached() {
        let (provider, store, cache) = setup();
        provider.set_leaderboard(2, 1, Some(5), 1000);

        assert_eq!(cache.resolve(Some(900), 1, 2).await.unwrap(), None);
        assert_eq!(store.get_position(900).unwrap(), None);
        assert_eq!(store.get_position(1000).unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_leaderboard_entry() {
        let (provider, store, cache) = setup();
        assert_eq!(cache.resolve(Some(900), 1, 2).await.unwrap(), None);
        assert_eq!(provider.leaderboard_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_position(900).unwrap(), None);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let (provider, _, cache) = setup();
        provider.unavailable.store(true, Ordering::SeqCst);
        assert!(cache.resolve(Some(900), 1, 2).await.unwrap_err().is_transient());
    }
}
