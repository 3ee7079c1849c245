pub mod spotify;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use spotify::SpotifyClient;

/// Language codes rendered right-to-left.
const RTL_LANGUAGES: &[&str] = &["ar", "fa", "he", "ur", "ps", "sd", "ug", "yi", "ku", "dv"];

/// Upstream catalog consulted on a cache miss.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LyricsSource: Send + Sync {
    /// Id of the best match for a free-text query, if any.
    async fn search_track(&self, query: &str) -> Result<Option<String>>;

    /// Synchronized lyrics for a track, `None` when the track has none.
    async fn fetch_lyrics(&self, track_id: &str) -> Result<Option<Lyrics>>;
}

/// One synchronized line as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub start_time_ms: String,
    #[serde(default)]
    pub duration_ms: String,
    pub words: String,
    #[serde(default)]
    pub syllables: Vec<String>,
    #[serde(default)]
    pub end_time_ms: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lyrics {
    pub lyrics: Vec<Line>,
    pub is_rtl_language: bool,
    pub language: String,
}

impl Lyrics {
    /// Builds the client view of raw upstream lines: durations derived from
    /// consecutive start times, RTL flag derived from the language.
    pub fn from_lines(mut lines: Vec<Line>, language: String) -> Self {
        fill_durations(&mut lines);
        Self {
            lyrics: lines,
            is_rtl_language: is_rtl_language(&language),
            language,
        }
    }
}

pub fn is_rtl_language(code: &str) -> bool {
    RTL_LANGUAGES.contains(&code)
}

/// Each line lasts until the next one starts; the last line gets 0.
/// Unparseable start times count as 0.
fn fill_durations(lines: &mut [Line]) {
    let starts: Vec<i64> = lines
        .iter()
        .map(|line| line.start_time_ms.parse().unwrap_or(0))
        .collect();

    for (i, line) in lines.iter_mut().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(starts[i]);
        line.duration_ms = end.saturating_sub(starts[i]).to_string();
    }
}
