//! Beatmap Metadata Cache
//!
//! Cache-aside layer in front of the osu! API for difficulty attributes and
//! raw `.osu` files. A cached entry is trusted only while its `last_updated`
//! token matches the one the upstream currently reports for the beatmap.

use crate::error::{PerfError, Result};
use crate::model::BeatmapAttributes;
use crate::osu_api::OsuProvider;
use crate::storage::{BeatmapStore, StoredBeatmap};
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct BeatmapDifficultyRecord {
    pub beatmap_id: u64,
    /// JSON blob as stored
    pub serialized_attributes: String,
    pub last_updated: DateTime<Utc>,
    pub attributes: BeatmapAttributes,
}

pub struct BeatmapMetadataCache {
    store: Arc<dyn BeatmapStore>,
    provider: Arc<dyn OsuProvider>,
    file_dir: PathBuf,
}

impl BeatmapMetadataCache {
    pub fn new(
        store: Arc<dyn BeatmapStore>,
        provider: Arc<dyn OsuProvider>,
        file_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            provider,
            file_dir: file_dir.into(),
        }
    }

    /// Return the cached record if it is current, otherwise fetch attributes
    /// and the raw file, then upsert. The row is written only after both
    /// fetches succeed.
    ///
    /// Concurrent misses for the same id may both fetch; the upsert is
    /// last-writer-wins.
    pub async fn resolve(
        &self,
        beatmap_id: u64,
        upstream_last_updated: DateTime<Utc>,
    ) -> Result<BeatmapDifficultyRecord> {
        if let Some(record) = self.load(beatmap_id)? {
            if record.last_updated == upstream_last_updated {
                debug!(beatmap_id, "Beatmap metadata cache hit");
                return Ok(record);
            }
            debug!(
                beatmap_id,
                stored = %record.last_updated,
                upstream = %upstream_last_updated,
                "Beatmap metadata is stale"
            );
        } else {
            debug!(beatmap_id, "Beatmap metadata cache miss");
        }

        let attributes = self.provider.beatmap(beatmap_id).await?;
        self.resolve_file(beatmap_id, upstream_last_updated).await?;
        let serialized_attributes = serde_json::to_string(&attributes)?;
        self.store.put_beatmap(&StoredBeatmap {
            beatmap_id,
            data: serialized_attributes.clone(),
            last_updated: encode_timestamp(&upstream_last_updated),
        })?;

        Ok(BeatmapDifficultyRecord {
            beatmap_id,
            serialized_attributes,
            last_updated: upstream_last_updated,
            attributes,
        })
    }

    /// Stored record, or `None` when absent or unreadable.
    fn load(&self, beatmap_id: u64) -> Result<Option<BeatmapDifficultyRecord>> {
        let Some(row) = self.store.get_beatmap(beatmap_id)? else {
            return Ok(None);
        };

        let last_updated = match DateTime::parse_from_rfc3339(&row.last_updated) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                warn!(beatmap_id, "Corrupt cached timestamp '{}': {}", row.last_updated, e);
                return Ok(None);
            }
        };
        let attributes = match serde_json::from_str::<BeatmapAttributes>(&row.data) {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(beatmap_id, "Corrupt cached beatmap attributes: {}", e);
                return Ok(None);
            }
        };

        Ok(Some(BeatmapDifficultyRecord {
            beatmap_id,
            serialized_attributes: row.data,
            last_updated,
            attributes,
        }))
    }

    /// Location of the `.osu` file for a beatmap version.
    pub fn file_path(&self, beatmap_id: u64, last_updated: DateTime<Utc>) -> PathBuf {
        self.file_dir
            .join(format!("{}_{}.osu", beatmap_id, last_updated.timestamp()))
    }

    /// Raw beatmap file, read from the local store or downloaded into it.
    /// Files are keyed by `(beatmap_id, last_updated)` so an updated beatmap
    /// never reuses an old file.
    pub async fn resolve_file(
        &self,
        beatmap_id: u64,
        upstream_last_updated: DateTime<Utc>,
    ) -> Result<String> {
        let path = self.file_path(beatmap_id, upstream_last_updated);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) if !contents.trim().is_empty() => {
                debug!(beatmap_id, "Beatmap file cache hit");
                return Ok(contents);
            }
            Ok(_) => warn!(beatmap_id, "Empty cached beatmap file {:?}, refetching", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(beatmap_id, "Beatmap file cache miss");
            }
            Err(e) => return Err(e.into()),
        }

        let contents = self.provider.beatmap_file(beatmap_id).await?;
        write_atomically(self.file_dir.clone(), path, contents.clone()).await?;
        Ok(contents)
    }
}

fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Write through a temp file in the same directory, then rename into place.
async fn write_atomically(dir: PathBuf, path: PathBuf, contents: String) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(Path::new(&path)).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| PerfError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{beatmap, timestamp};
    use crate::storage::CacheStore;
    use crate::testing::FakeProvider;
    use std::sync::atomic::Ordering;

    fn cache_with(
        provider: Arc<FakeProvider>,
        store: Arc<CacheStore>,
        dir: &Path,
    ) -> BeatmapMetadataCache {
        BeatmapMetadataCache::new(store, provider, dir)
    }

    #[tokio::test]
    async fn test_miss_then_hit_without_fetch() {
        let t = timestamp(1_650_000_000);
        let provider = Arc::new(FakeProvider::with_beatmap(beatmap(7, t)));
        let store = Arc::new(CacheStore::in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider.clone(), store, dir.path());

        let first = cache.resolve(7, t).await.unwrap();
        assert_eq!(provider.beatmap_calls.load(Ordering::SeqCst), 1);

        let second = cache.resolve(7, t).await.unwrap();
        assert_eq!(provider.beatmap_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.serialized_attributes, first.serialized_attributes);
        assert_eq!(second.attributes, first.attributes);
        assert_eq!(second.last_updated, t);
    }

    #[tokio::test]
    async fn test_stored_blob_is_returned_verbatim() {
        let t = timestamp(1_650_000_000);
        let provider = Arc::new(FakeProvider::default());
        let store = Arc::new(CacheStore::in_memory().unwrap());

        let blob = serde_json::to_string(&beatmap(7, t)).unwrap();
        store
            .put_beatmap(&StoredBeatmap {
                beatmap_id: 7,
                data: blob.clone(),
                last_updated: encode_timestamp(&t),
            })
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider.clone(), store, dir.path());
        let record = cache.resolve(7, t).await.unwrap();

        assert_eq!(record.serialized_attributes, blob);
        assert_eq!(provider.beatmap_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_new_upstream_timestamp_refetches_once_and_overwrites() {
        let t1 = timestamp(1_600_000_000);
        let t2 = timestamp(1_700_000_000);
        let provider = Arc::new(FakeProvider::with_beatmap(beatmap(7, t1)));
        let store = Arc::new(CacheStore::in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider.clone(), store.clone(), dir.path());

        cache.resolve(7, t1).await.unwrap();

        let mut updated = beatmap(7, t2);
        updated.stars = 6.5;
        provider.beatmaps.lock().insert(7, updated);

        let record = cache.resolve(7, t2).await.unwrap();
        assert_eq!(provider.beatmap_calls.load(Ordering::SeqCst), 2);
        assert_eq!(record.attributes.stars, 6.5);

        let row = store.get_beatmap(7).unwrap().unwrap();
        assert_eq!(row.last_updated, encode_timestamp(&t2));
        assert_eq!(row.data, record.serialized_attributes);

        // Now current again
        cache.resolve(7, t2).await.unwrap();
        assert_eq!(provider.beatmap_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_a_miss() {
        let t = timestamp(1_650_000_000);
        let provider = Arc::new(FakeProvider::with_beatmap(beatmap(7, t)));
        let store = Arc::new(CacheStore::in_memory().unwrap());
        store
            .put_beatmap(&StoredBeatmap {
                beatmap_id: 7,
                data: "{not json".to_string(),
                last_updated: encode_timestamp(&t),
            })
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider.clone(), store.clone(), dir.path());
        let record = cache.resolve(7, t).await.unwrap();

        assert_eq!(provider.beatmap_calls.load(Ordering::SeqCst), 1);
        assert_eq!(record.attributes.id, 7);
        assert_ne!(store.get_beatmap(7).unwrap().unwrap().data, "{not json");
    }

    #[tokio::test]
    async fn test_corrupt_timestamp_is_a_miss() {
        let t = timestamp(1_650_000_000);
        let provider = Arc::new(FakeProvider::with_beatmap(beatmap(7, t)));
        let store = Arc::new(CacheStore::in_memory().unwrap());
        store
            .put_beatmap(&StoredBeatmap {
                beatmap_id: 7,
                data: serde_json::to_string(&beatmap(7, t)).unwrap(),
                last_updated: "yesterday".to_string(),
            })
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider.clone(), store, dir.path());
        cache.resolve(7, t).await.unwrap();
        assert_eq!(provider.beatmap_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let t = timestamp(1_650_000_000);
        let provider = Arc::new(FakeProvider::with_beatmap(beatmap(7, t)));
        provider.unavailable.store(true, Ordering::SeqCst);
        let store = Arc::new(CacheStore::in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider, store.clone(), dir.path());

        let err = cache.resolve(7, t).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.get_beatmap(7).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_miss_fills_file_store() {
        let t = timestamp(1_650_000_000);
        let provider = Arc::new(FakeProvider::with_beatmap(beatmap(7, t)));
        let store = Arc::new(CacheStore::in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider.clone(), store, dir.path());

        cache.resolve(7, t).await.unwrap();
        assert_eq!(provider.file_calls.load(Ordering::SeqCst), 1);
        assert!(cache.file_path(7, t).exists());

        // A hit touches neither endpoint
        cache.resolve(7, t).await.unwrap();
        assert_eq!(provider.file_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_fetches_new_file_version() {
        let t1 = timestamp(1_600_000_000);
        let t2 = timestamp(1_700_000_000);
        let provider = Arc::new(FakeProvider::with_beatmap(beatmap(7, t1)));
        let store = Arc::new(CacheStore::in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider.clone(), store, dir.path());

        cache.resolve(7, t1).await.unwrap();
        cache.resolve(7, t2).await.unwrap();
        assert_eq!(provider.file_calls.load(Ordering::SeqCst), 2);
        assert!(cache.file_path(7, t1).exists());
        assert!(cache.file_path(7, t2).exists());
    }

    #[tokio::test]
    async fn test_file_failure_fails_resolve_without_upsert() {
        let t = timestamp(1_650_000_000);
        let provider = Arc::new(FakeProvider::with_beatmap(beatmap(7, t)));
        provider.files.lock().clear();
        let store = Arc::new(CacheStore::in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider.clone(), store.clone(), dir.path());

        let err = cache.resolve(7, t).await.unwrap_err();
        assert!(matches!(err, PerfError::Decode(_)));
        assert!(store.get_beatmap(7).unwrap().is_none());
        assert!(!cache.file_path(7, t).exists());
    }

    #[tokio::test]
    async fn test_file_store_keyed_by_version() {
        let t1 = timestamp(1_600_000_000);
        let t2 = timestamp(1_700_000_000);
        let provider = Arc::new(FakeProvider::default());
        provider.files.lock().insert(7, "osu file format v14\n// v1".to_string());
        let store = Arc::new(CacheStore::in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider.clone(), store, dir.path());

        let first = cache.resolve_file(7, t1).await.unwrap();
        let again = cache.resolve_file(7, t1).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(provider.file_calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("7_1600000000.osu").exists());

        provider.files.lock().insert(7, "osu file format v14\n// v2".to_string());
        let updated = cache.resolve_file(7, t2).await.unwrap();
        assert!(updated.ends_with("v2"));
        assert_eq!(provider.file_calls.load(Ordering::SeqCst), 2);

        // The old version is still served from its own key
        assert!(cache.resolve_file(7, t1).await.unwrap().ends_with("v1"));
        assert_eq!(provider.file_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_cached_file_is_refetched() {
        let t = timestamp(1_600_000_000);
        let provider = Arc::new(FakeProvider::default());
        provider.files.lock().insert(7, "osu file format v14".to_string());
        let store = Arc::new(CacheStore::in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with(provider.clone(), store, dir.path());

        std::fs::write(cache.file_path(7, t), "").unwrap();
        let file = cache.resolve_file(7, t).await.unwrap();
        assert_eq!(file, "osu file format v14");
        assert_eq!(provider.file_calls.load(Ordering::SeqCst), 1);
    }
}
