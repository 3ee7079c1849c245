use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use reqwest::{header, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use super::{Line, Lyrics, LyricsSource};
use crate::{cache::ExpiringCache, config::Config};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebPlayerToken {
    access_token: String,
    access_token_expiration_timestamp_ms: i64,
}

#[derive(Debug, Deserialize)]
struct OauthToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: SearchTracks,
}

#[derive(Debug, Deserialize)]
struct SearchTracks {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LyricsResponse {
    lyrics: LyricsBody,
}

#[derive(Debug, Deserialize)]
struct LyricsBody {
    #[serde(default)]
    lines: Vec<Line>,
    #[serde(default)]
    language: String,
}

/// Client for the catalog's web-player and public APIs.
///
/// Both access tokens are memoized in the shared cache under their
/// configured keys, so they are refreshed only when they expire.
pub struct SpotifyClient {
    client: reqwest::Client,
    cache: Arc<ExpiringCache>,
    lyrics_url: String,
    track_url: String,
    token_url: String,
    token_key: String,
    oauth_token_url: String,
    oauth_token_key: String,
    client_id: String,
    client_secret: String,
    app_platform: String,
    user_agent: String,
    cookie: String,
}

impl SpotifyClient {
    pub fn new(config: &Config, cache: Arc<ExpiringCache>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            cache,
            lyrics_url: config.lyrics_url.clone(),
            track_url: config.track_url.clone(),
            token_url: config.token_url.clone(),
            token_key: config.token_key.clone(),
            oauth_token_url: config.oauth_token_url.clone(),
            oauth_token_key: config.oauth_token_key.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            app_platform: config.app_platform.clone(),
            user_agent: config.user_agent.clone(),
            cookie: config.cookie_header(),
        })
    }

    fn with_common_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("App-Platform", &self.app_platform)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::COOKIE, &self.cookie)
    }

    fn cached_token(&self, key: &str) -> Option<String> {
        match self.cache.get(key) {
            Ok(token) => token,
            Err(e) => {
                warn!("⚠️ Ignoring unreadable cached token: {}", e);
                None
            }
        }
    }

    fn store_token(&self, key: &str, token: &str, ttl: Duration) {
        if let Err(e) = self.cache.set(key, token, ttl) {
            warn!("⚠️ Could not cache token {}: {}", key, e);
        }
    }

    /// Web-player token used for the lyrics endpoint.
    async fn web_player_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token(&self.token_key) {
            debug!("🔑 Using cached web-player token");
            return Ok(token);
        }

        let response = self.with_common_headers(self.client.get(&self.token_url)).send().await?;
        let token: WebPlayerToken = ensure_ok(response, "token").await?.json().await?;

        let ttl = remaining_ttl(
            token.access_token_expiration_timestamp_ms,
            Utc::now().timestamp_millis(),
        );
        info!("🔑 Caching web-player token for {}", humantime::format_duration(ttl));
        self.store_token(&self.token_key, &token.access_token, ttl);

        Ok(token.access_token)
    }

    /// Client-credentials token used for search.
    async fn oauth_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token(&self.oauth_token_key) {
            debug!("🔑 Using cached OAuth token");
            return Ok(token);
        }

        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .client
            .post(&self.oauth_token_url)
            .header(header::AUTHORIZATION, format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("error making token request")?;

        let token: OauthToken = ensure_ok(response, "OAuth token")
            .await?
            .json()
            .await
            .context("error parsing token response")?;

        info!("🔑 Caching OAuth token for {}s", token.expires_in);
        let ttl = Duration::from_secs(token.expires_in);
        self.store_token(&self.oauth_token_key, &token.access_token, ttl);

        Ok(token.access_token)
    }
}

#[async_trait]
impl LyricsSource for SpotifyClient {
    async fn search_track(&self, query: &str) -> Result<Option<String>> {
        let token = self.oauth_token().await.context("error getting access token")?;
        let url = format!("{}{}", self.track_url, query);
        debug!("🔍 Searching track: {}", query);

        let response = self
            .with_common_headers(self.client.get(&url))
            .bearer_auth(token)
            .send()
            .await
            .context("error making search request")?;

        let found: SearchResponse = ensure_ok(response, "search")
            .await?
            .json()
            .await
            .context("error parsing search response")?;

        Ok(found.tracks.items.into_iter().next().map(|item| item.id))
    }

    async fn fetch_lyrics(&self, track_id: &str) -> Result<Option<Lyrics>> {
        let token = self.web_player_token().await?;
        let url = format!("{}{}?format=json&market=from_token", self.lyrics_url, track_id);
        debug!("📝 Fetching lyrics for {}", track_id);

        let response = self
            .with_common_headers(self.client.get(&url))
            .bearer_auth(token)
            .send()
            .await?;

        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::NO_CONTENT) {
            debug!("📭 No lyrics upstream for {}", track_id);
            return Ok(None);
        }

        let body: LyricsResponse = ensure_ok(response, "lyrics").await?.json().await?;
        Ok(Some(Lyrics::from_lines(body.lyrics.lines, body.lyrics.language)))
    }
}

async fn ensure_ok(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!("❌ Upstream {} request failed: {} - {}", what, status, body);
    anyhow::bail!("HTTP request failed with status code {}", status.as_u16())
}

/// Whole seconds left until `expires_at_ms`, zero once it has passed.
fn remaining_ttl(expires_at_ms: i64, now_ms: i64) -> Duration {
    let remaining = expires_at_ms.saturating_sub(now_ms).max(0) / 1000;
    Duration::from_secs(remaining as u64)
}
