//! Pipeline Configuration
//!
//! Endpoints, credentials, local cache locations and fan-out limits.
//! Values come from defaults, an optional TOML file, and environment
//! overrides, in that order.

use crate::error::{PerfError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default osu! API v2 base URL
pub const DEFAULT_OSU_API_BASE: &str = "https://osu.ppy.sh/api/v2";

/// Default raw beatmap file endpoint
pub const DEFAULT_OSU_FILE_BASE: &str = "https://osu.ppy.sh/osu";

/// Default OAuth token endpoint
pub const DEFAULT_OSU_TOKEN_URL: &str = "https://osu.ppy.sh/oauth/token";

/// Default difficulty backend base URL
pub const DEFAULT_DIFFICULTY_API_BASE: &str = "http://localhost:5000";

/// Default HTTP timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default upper bound on parallel backend requests per fan-out
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 5;

/// Canonical accuracy projections
pub const DEFAULT_ACCURACY_THRESHOLDS: [f64; 5] = [1.00, 0.99, 0.98, 0.97, 0.95];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfConfig {
    pub osu_api_base: String,
    pub osu_file_base: String,
    pub osu_token_url: String,
    pub osu_client_id: u64,
    pub osu_client_secret: String,
    pub difficulty_api_base: String,
    /// SQLite file holding beatmap metadata and score positions
    pub database_path: PathBuf,
    /// Directory for raw `.osu` files
    pub beatmap_file_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub max_concurrent_requests: usize,
    pub accuracy_thresholds: Vec<f64>,
    pub retry: RetryPolicy,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            osu_api_base: DEFAULT_OSU_API_BASE.to_string(),
            osu_file_base: DEFAULT_OSU_FILE_BASE.to_string(),
            osu_token_url: DEFAULT_OSU_TOKEN_URL.to_string(),
            osu_client_id: 0,
            osu_client_secret: String::new(),
            difficulty_api_base: DEFAULT_DIFFICULTY_API_BASE.to_string(),
            database_path: PathBuf::from("data/osu-perf.db"),
            beatmap_file_dir: PathBuf::from("data/beatmap_files"),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            accuracy_thresholds: DEFAULT_ACCURACY_THRESHOLDS.to_vec(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PerfConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a (possibly partial) TOML file, then apply environment overrides.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&raw)
            .map_err(|e| PerfError::invalid(format!("config {}: {}", path.display(), e)))?;
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("OSU_CLIENT_ID") {
            self.osu_client_id = v;
        }
        if let Ok(v) = std::env::var("OSU_CLIENT_SECRET") {
            self.osu_client_secret = v;
        }
        if let Ok(v) = std::env::var("OSU_API_BASE") {
            self.osu_api_base = v;
        }
        if let Ok(v) = std::env::var("DIFFICULTY_API_BASE") {
            self.difficulty_api_base = v;
        }
        if let Ok(v) = std::env::var("OSU_PERF_DB") {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("OSU_PERF_BEATMAP_DIR") {
            self.beatmap_file_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parse("OSU_PERF_TIMEOUT_SECS") {
            self.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("OSU_PERF_MAX_CONCURRENCY") {
            self.max_concurrent_requests = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            return Err(PerfError::invalid("max_concurrent_requests must be > 0"));
        }
        if self.accuracy_thresholds.is_empty() {
            return Err(PerfError::invalid("accuracy_thresholds must not be empty"));
        }
        if let Some(bad) = self
            .accuracy_thresholds
            .iter()
            .find(|a| !(**a > 0.0 && **a <= 1.0))
        {
            return Err(PerfError::invalid(format!(
                "accuracy threshold {} outside (0, 1]",
                bad
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
