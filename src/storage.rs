//! Local SQLite storage for cached beatmap metadata and score positions
//!
//! One row per beatmap id and one row per score id. Writes are independent
//! upserts; there is no cross-row transaction.

use crate::error::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS beatmap_data (
    map_id INTEGER PRIMARY KEY,
    data TEXT NOT NULL,
    last_updated TEXT NOT NULL,
    cached_at INTEGER DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS score_positions (
    score_id INTEGER PRIMARY KEY,
    position INTEGER NOT NULL,
    cached_at INTEGER DEFAULT (strftime('%s', 'now'))
);
"#;

/// Beatmap row exactly as stored. Parsing happens in the cache layer so a
/// corrupt row can be treated as a miss there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBeatmap {
    pub beatmap_id: u64,
    pub data: String,
    pub last_updated: String,
}

pub trait BeatmapStore: Send + Sync {
    fn get_beatmap(&self, beatmap_id: u64) -> Result<Option<StoredBeatmap>>;

    /// Insert or overwrite the row for `row.beatmap_id`.
    fn put_beatmap(&self, row: &StoredBeatmap) -> Result<()>;
}

pub trait PositionStore: Send + Sync {
    fn get_position(&self, score_id: u64) -> Result<Option<u32>>;

    fn put_position(&self, score_id: u64, position: u32) -> Result<()>;
}

#[derive(Clone)]
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl CacheStore {
    /// Create storage at the specified path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!("Cache store initialized at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl BeatmapStore for CacheStore {
    fn get_beatmap(&self, beatmap_id: u64) -> Result<Option<StoredBeatmap>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT data, last_updated FROM beatmap_data WHERE map_id = ?1",
                params![beatmap_id as i64],
                |row| {
                    Ok(StoredBeatmap {
                        beatmap_id,
                        data: row.get(0)?,
                        last_updated: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn put_beatmap(&self, row: &StoredBeatmap) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO beatmap_data (map_id, data, last_updated) VALUES (?1, ?2, ?3)
             ON CONFLICT(map_id) DO UPDATE SET
                data = excluded.data,
                last_updated = excluded.last_updated,
                cached_at = strftime('%s', 'now')",
            params![row.beatmap_id as i64, row.data, row.last_updated],
        )?;
        Ok(())
    }
}

impl PositionStore for CacheStore {
    fn get_position(&self, score_id: u64) -> Result<Option<u32>> {
        let conn = self.conn.lock();
        let position: Option<i64> = conn
            .query_row(
                "SELECT position FROM score_positions WHERE score_id = ?1",
                params![score_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = position else {
            return Ok(None);
        };
        match u32::try_from(raw) {
            Ok(position) => Ok(Some(position)),
            Err(_) => {
                warn!(score_id, "Corrupt cached score position {}, ignoring", raw);
                Ok(None)
            }
        }
    }

    fn put_position(&self, score_id: u64, position: u32) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO score_positions (score_id, position) VALUES (?1, ?2)",
            params![score_id as i64, position as i64],
        )?;
        Ok(())
    }
}
