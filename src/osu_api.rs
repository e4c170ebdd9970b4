//! osu! API v2 client
//!
//! Read-only access to beatmap metadata, raw beatmap files and leaderboard
//! entries. Authenticates with the client-credentials grant; the token is
//! refreshed shortly before it expires and once more if the API rejects it.

use crate::config::PerfConfig;
use crate::error::{PerfError, Result};
use crate::model::{BeatmapAttributes, Score, UserBeatmapScore};
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Refresh the token this long before the API would expire it
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    Recent,
    Best,
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreKind::Recent => f.write_str("recent"),
            ScoreKind::Best => f.write_str("best"),
        }
    }
}

/// Upstream game-statistics provider.
#[async_trait]
pub trait OsuProvider: Send + Sync {
    async fn beatmap(&self, beatmap_id: u64) -> Result<BeatmapAttributes>;

    /// Raw `.osu` definition file
    async fn beatmap_file(&self, beatmap_id: u64) -> Result<String>;

    /// The user's best score on a beatmap, `None` if they have none
    async fn user_beatmap_score(
        &self,
        beatmap_id: u64,
        user_id: u64,
    ) -> Result<Option<UserBeatmapScore>>;

    async fn user_scores(&self, user_id: u64, kind: ScoreKind, limit: u32) -> Result<Vec<Score>>;
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: u64,
    client_secret: &'a str,
    grant_type: &'static str,
    scope: &'static str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

pub struct OsuApiClient {
    client: Client,
    api_base: String,
    file_base: String,
    token_url: String,
    client_id: u64,
    client_secret: String,
    retry: RetryPolicy,
    token: RwLock<Option<AccessToken>>,
}

impl OsuApiClient {
    pub fn new(config: &PerfConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PerfError::Transient(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.osu_api_base.trim_end_matches('/').to_string(),
            file_base: config.osu_file_base.trim_end_matches('/').to_string(),
            token_url: config.osu_token_url.clone(),
            client_id: config.osu_client_id,
            client_secret: config.osu_client_secret.clone(),
            retry: config.retry,
            token: RwLock::new(None),
        })
    }

    fn cached_token(&self) -> Option<String> {
        self.token
            .read()
            .as_ref()
            .filter(|t| t.is_fresh())
            .map(|t| t.value.clone())
    }

    async fn token(&self) -> Result<String> {
        match self.cached_token() {
            Some(token) => Ok(token),
            None => self.refresh_token().await,
        }
    }

    async fn refresh_token(&self) -> Result<String> {
        let token = retry_with_backoff(
            &self.retry,
            "osu token refresh",
            PerfError::is_transient,
            move || self.request_token(),
        )
        .await?;

        let value = token.value.clone();
        *self.token.write() = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> Result<AccessToken> {
        let resp = self
            .client
            .post(&self.token_url)
            .json(&TokenRequest {
                client_id: self.client_id,
                client_secret: &self.client_secret,
                grant_type: "client_credentials",
                scope: "public",
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PerfError::from_status(status, body));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| PerfError::Decode(format!("token response: {}", e)))?;
        info!("Obtained osu! API token (expires in {}s)", token.expires_in);

        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    async fn send(&self, url: &str, query: &[(&str, String)], token: &str) -> Result<Response> {
        Ok(self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?)
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let token = self.token().await?;
        let mut resp = self.send(url, query, &token).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            debug!("osu! API rejected token, refreshing");
            let token = self.refresh_token().await?;
            resp = self.send(url, query, &token).await?;
        }

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PerfError::from_status(status, body));
        }

        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| PerfError::Decode(format!("{}: {}", url, e)))
    }

    /// GET with rate-limit retries. 404 maps to `None`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.api_base, path);
        let url = url.as_str();
        retry_with_backoff(
            &self.retry,
            url,
            |e: &PerfError| matches!(e, PerfError::RateLimited(_)),
            move || self.get_json_once(url, query),
        )
        .await
    }
}

#[async_trait]
impl OsuProvider for OsuApiClient {
    async fn beatmap(&self, beatmap_id: u64) -> Result<BeatmapAttributes> {
        self.get_json(&format!("/beatmaps/{}", beatmap_id), &[])
            .await?
            .ok_or_else(|| PerfError::Upstream {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("beatmap {} not found", beatmap_id),
            })
    }

    async fn beatmap_file(&self, beatmap_id: u64) -> Result<String> {
        let url = format!("{}/{}", self.file_base, beatmap_id);
        debug!("Downloading beatmap file {}", url);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PerfError::from_status(status, body));
        }

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Err(PerfError::Decode(format!(
                "empty beatmap file for {}",
                beatmap_id
            )));
        }
        Ok(text)
    }

    async fn user_beatmap_score(
        &self,
        beatmap_id: u64,
        user_id: u64,
    ) -> Result<Option<UserBeatmapScore>> {
        self.get_json(
            &format!("/beatmaps/{}/scores/users/{}", beatmap_id, user_id),
            &[],
        )
        .await
    }

    async fn user_scores(&self, user_id: u64, kind: ScoreKind, limit: u32) -> Result<Vec<Score>> {
        let query = [
            ("limit", limit.to_string()),
            ("include_fails", "1".to_string()),
        ];
        Ok(self
            .get_json(&format!("/users/{}/scores/{}", user_id, kind), &query)
            .await?
            .unwrap_or_default())
    }
}
