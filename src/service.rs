//! Track and lyrics lookups memoized through the shared cache.

use std::{future::Future, sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    cache::ExpiringCache,
    error::ApiError,
    sources::{Lyrics, LyricsSource},
};

pub struct LyricsService {
    cache: Arc<ExpiringCache>,
    source: Arc<dyn LyricsSource>,
    track_ttl: Duration,
    lyrics_ttl: Duration,
}

impl LyricsService {
    pub fn new(
        cache: Arc<ExpiringCache>,
        source: Arc<dyn LyricsSource>,
        track_ttl: Duration,
        lyrics_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            track_ttl,
            lyrics_ttl,
        }
    }

    pub fn cache(&self) -> &Arc<ExpiringCache> {
        &self.cache
    }

    /// Picks the track to serve: an explicit id wins, otherwise the
    /// `"<song> <artist>"` query is searched (and memoized) upstream.
    pub async fn resolve_track(
        &self,
        song: &str,
        artist: &str,
        track_id: &str,
    ) -> Result<String, ApiError> {
        if !track_id.is_empty() {
            return Ok(track_id.to_string());
        }
        if song.is_empty() && artist.is_empty() {
            return Err(ApiError::MissingQuery);
        }

        let query = query_escape(&format!("{} {}", song, artist));
        let key = format!("track:{}", query);
        let source = self.source.clone();

        let id = self
            .cached(&key, self.track_ttl, || async move { source.search_track(&query).await })
            .await?;

        id.ok_or(ApiError::TrackNotFound)
    }

    pub async fn lyrics_for(&self, track_id: &str) -> Result<Lyrics, ApiError> {
        let key = format!("lyrics:{}", track_id);

        if let Some(raw) = self.lookup(&key) {
            match serde_json::from_str::<Lyrics>(&raw) {
                Ok(lyrics) => {
                    info!("🎯 Found cached lyrics for {}", track_id);
                    return Ok(lyrics);
                }
                Err(e) => {
                    warn!("⚠️ Discarding malformed cached lyrics for {}: {}", track_id, e)
                }
            }
        }

        let lyrics = self
            .source
            .fetch_lyrics(track_id)
            .await?
            .ok_or(ApiError::LyricsUnavailable)?;

        match serde_json::to_string(&lyrics) {
            Ok(serialized) => self.store(&key, &serialized, self.lyrics_ttl),
            Err(e) => warn!("⚠️ Could not serialize lyrics for {}: {}", track_id, e),
        }

        Ok(lyrics)
    }

    /// Cache-aside for plain string values. `None` results are not stored.
    async fn cached<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> anyhow::Result<Option<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<String>>>,
    {
        if let Some(hit) = self.lookup(key) {
            info!("🎯 Cache hit: {}", key);
            return Ok(Some(hit));
        }

        let fetched = fetch().await?;
        if let Some(value) = &fetched {
            self.store(key, value, ttl);
        }
        Ok(fetched)
    }

    /// Cache read where a decode failure degrades to a miss.
    fn lookup(&self, key: &str) -> Option<String> {
        match self.cache.get(key) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("⚠️ Treating unreadable entry as a miss: {}", e);
                None
            }
        }
    }

    fn store(&self, key: &str, value: &str, ttl: Duration) {
        match self.cache.set(key, value, ttl) {
            Ok(()) => info!("💾 Cached {}", key),
            Err(e) => warn!("⚠️ Could not cache {}: {}", key, e),
        }
    }
}

/// Query-string escaping: unreserved characters stay, spaces become `+`,
/// everything else is percent-encoded.
fn query_escape(raw: &str) -> String {
    urlencoding::encode(raw).replace("%20", "+")
}
