use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::AppState;
use crate::{cache::CacheDump, error::ApiError, sources::Line};

/// Query parameters of `/getLyrics`. Aliases of the same field are
/// concatenated, so a client may use whichever spelling it prefers.
#[derive(Debug, Default, Deserialize)]
pub struct LyricsQuery {
    #[serde(default)]
    s: String,
    #[serde(default)]
    song: String,
    #[serde(default, rename = "songName")]
    song_name: String,
    #[serde(default)]
    a: String,
    #[serde(default)]
    artist: String,
    #[serde(default, rename = "artistName")]
    artist_name: String,
    #[serde(default)]
    t_id: String,
    #[serde(default, rename = "trackId")]
    track_id: String,
}

impl LyricsQuery {
    fn song(&self) -> String {
        [self.s.as_str(), self.song.as_str(), self.song_name.as_str()].concat()
    }

    fn artist(&self) -> String {
        [self.a.as_str(), self.artist.as_str(), self.artist_name.as_str()].concat()
    }

    fn track_id(&self) -> String {
        [self.t_id.as_str(), self.track_id.as_str()].concat()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsResponse {
    error: Option<String>,
    track_id: String,
    lyrics: Vec<Line>,
    is_rtl_language: bool,
    language: String,
}

pub async fn get_lyrics(
    State(state): State<AppState>,
    Query(query): Query<LyricsQuery>,
) -> Result<Json<LyricsResponse>, ApiError> {
    let track_id = state
        .service
        .resolve_track(&query.song(), &query.artist(), &query.track_id())
        .await?;
    let lyrics = state.service.lyrics_for(&track_id).await?;

    Ok(Json(LyricsResponse {
        error: None,
        track_id,
        lyrics: lyrics.lyrics,
        is_rtl_language: lyrics.is_rtl_language,
        language: lyrics.language,
    }))
}

pub async fn get_cache_dump(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CacheDump>, ApiError> {
    let credential = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let dump = state
        .service
        .cache()
        .dump_authorized(credential, &state.cache_access_token)?;
    Ok(Json(dump))
}

pub async fn help() -> Json<Value> {
    Json(json!({
        "help": concat!(
            "Use /getLyrics to get the lyrics of a song. ",
            "Provide the song name and artist name as query parameters. ",
            "Example: /getLyrics?s=Shape%20of%20You&a=Ed%20Sheeran",
        ),
    }))
}
