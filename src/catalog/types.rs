//! Catalog wire types and the domain values built from them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use tracing::warn;

// ==================== Domain Types ====================

/// Audio track category offered by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioType {
    /// Original audio with subtitles (the primary type).
    Sub,
    /// Dubbed audio (the secondary type).
    Dub,
}

impl AudioType {
    /// Query value used by the catalog API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sub => "sub",
            Self::Dub => "dub",
        }
    }
}

impl fmt::Display for AudioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sub" => Ok(Self::Sub),
            "dub" => Ok(Self::Dub),
            other => Err(format!("invalid audio type '{other}': expected 'sub' or 'dub'")),
        }
    }
}

/// One catalog search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimeSummary {
    /// Catalog identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Number of subbed episodes, when reported.
    pub sub_episodes: Option<u32>,
    /// Number of dubbed episodes, when reported.
    pub dub_episodes: Option<u32>,
}

impl AnimeSummary {
    /// Label shown in the selection prompt.
    #[must_use]
    pub fn label(&self) -> String {
        match (self.sub_episodes, self.dub_episodes) {
            (Some(sub), Some(dub)) => format!("{} (sub {sub}, dub {dub})", self.title),
            (Some(sub), None) => format!("{} (sub {sub})", self.title),
            (None, Some(dub)) => format!("{} (dub {dub})", self.title),
            (None, None) => self.title.clone(),
        }
    }
}

/// Basic anime info fetched by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimeInfo {
    /// Catalog identifier.
    pub id: String,
    /// Display title.
    pub title: String,
}

/// One episode of an anime.
///
/// Identity is `number` within one anime; `stream_id` is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRef {
    /// Positive episode number.
    pub number: u32,
    /// Catalog identifier used for server/source lookups.
    pub stream_id: String,
    /// Episode title (may be empty).
    pub title: String,
}

/// Full episode listing for one anime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeList {
    /// Total count reported by the catalog.
    pub total: usize,
    /// Episodes sorted ascending by number.
    pub episodes: Vec<EpisodeRef>,
}

impl EpisodeList {
    /// Sorted episode numbers.
    #[must_use]
    pub fn numbers(&self) -> Vec<u32> {
        self.episodes.iter().map(|e| e.number).collect()
    }

    /// Count used for filename padding: the larger of the reported total,
    /// the listing length, and the highest episode number.
    #[must_use]
    pub fn padding_basis(&self) -> usize {
        let highest = self
            .episodes
            .iter()
            .map(|e| e.number as usize)
            .max()
            .unwrap_or(0);
        self.total.max(self.episodes.len()).max(highest)
    }
}

/// Server names grouped by audio type, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerList {
    /// Servers carrying subbed audio.
    pub sub: Vec<String>,
    /// Servers carrying dubbed audio.
    pub dub: Vec<String>,
}

impl ServerList {
    /// Servers for one audio type.
    #[must_use]
    pub fn for_audio(&self, audio: AudioType) -> &[String] {
        match audio {
            AudioType::Sub => &self.sub,
            AudioType::Dub => &self.dub,
        }
    }
}

/// A subtitle track advertised by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
    /// Language label as reported (e.g. `English`).
    pub language: String,
    /// Absolute URL of the `.vtt` file.
    pub url: String,
    /// Whether the catalog marks this track as the default.
    pub is_default: bool,
}

/// Raw source payload for one `(episode, server, audio)` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePayload {
    /// Primary video URL (may be empty if the catalog returned none).
    pub video_url: String,
    /// True when the video URL is an HLS manifest.
    pub is_segmented: bool,
    /// Subtitle tracks in catalog order.
    pub subtitle_tracks: Vec<SubtitleTrack>,
    /// Referer the media host requires, if any.
    pub required_referer: Option<String>,
}

// ==================== Catalog API Response Types ====================

/// Envelope wrapping every catalog response.
///
/// `success` may be absent; a 2xx response without it is accepted.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub success: Option<bool>,
    pub data: Option<T>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchData {
    #[serde(default)]
    pub animes: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    pub id: String,
    pub name: String,
    pub episodes: Option<EpisodeCounts>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EpisodeCounts {
    pub sub: Option<u32>,
    pub dub: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfoData {
    pub anime: InfoAnime,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfoAnime {
    pub info: InfoDetails,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfoDetails {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EpisodesData {
    #[serde(default)]
    pub total_episodes: usize,
    #[serde(default)]
    pub episodes: Vec<EpisodeDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EpisodeDto {
    #[serde(default, deserialize_with = "de_episode_number")]
    pub number: Option<u32>,
    pub title: Option<String>,
    pub episode_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServersData {
    #[serde(default)]
    pub sub: Vec<ServerDto>,
    #[serde(default)]
    pub dub: Vec<ServerDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerDto {
    pub server_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SourcesData {
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub sources: Vec<SourceDto>,
    #[serde(default)]
    pub tracks: Vec<TrackDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SourceDto {
    #[serde(default)]
    pub url: String,
    #[serde(rename = "isM3U8")]
    pub is_m3u8: Option<bool>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackDto {
    #[serde(alias = "file")]
    pub url: String,
    #[serde(alias = "label")]
    pub lang: Option<String>,
    pub kind: Option<String>,
    #[serde(default)]
    pub default: bool,
}

/// Accepts a number or a numeric string; anything else becomes `None`.
fn de_episode_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    })
}

// ==================== Conversions ====================

impl From<SearchHit> for AnimeSummary {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.id,
            title: hit.name,
            sub_episodes: hit.episodes.as_ref().and_then(|e| e.sub),
            dub_episodes: hit.episodes.as_ref().and_then(|e| e.dub),
        }
    }
}

impl From<EpisodesData> for EpisodeList {
    fn from(data: EpisodesData) -> Self {
        let mut episodes: Vec<EpisodeRef> = data
            .episodes
            .into_iter()
            .filter_map(|e| match e.number.filter(|&n| n > 0) {
                Some(number) => Some((number, e)),
                None => {
                    warn!(episode_id = %e.episode_id, "dropping episode without a usable number");
                    None
                }
            })
            .map(|(number, e)| EpisodeRef {
                number,
                stream_id: e.episode_id,
                title: e.title.unwrap_or_default().trim().to_string(),
            })
            .collect();
        episodes.sort_by_key(|e| e.number);
        episodes.dedup_by_key(|e| e.number);
        Self {
            total: data.total_episodes,
            episodes,
        }
    }
}

impl From<ServersData> for ServerList {
    fn from(data: ServersData) -> Self {
        Self {
            sub: data.sub.into_iter().map(|s| s.server_name).collect(),
            dub: data.dub.into_iter().map(|s| s.server_name).collect(),
        }
    }
}

impl From<SourcesData> for SourcePayload {
    fn from(data: SourcesData) -> Self {
        let primary = data
            .sources
            .iter()
            .find(|s| !s.url.trim().is_empty())
            .or_else(|| data.sources.first());
        let video_url = primary.map(|s| s.url.trim().to_string()).unwrap_or_default();
        let is_segmented = primary.is_some_and(|s| {
            s.is_m3u8.unwrap_or(false)
                || s.kind.as_deref().is_some_and(|k| k.eq_ignore_ascii_case("hls"))
                || s.url.to_ascii_lowercase().contains(".m3u8")
        });
        let required_referer = data
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("referer"))
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let subtitle_tracks = data
            .tracks
            .into_iter()
            .filter(|t| {
                !t.url.trim().is_empty()
                    && !t
                        .kind
                        .as_deref()
                        .is_some_and(|k| k.eq_ignore_ascii_case("thumbnails"))
                    && !t
                        .lang
                        .as_deref()
                        .is_some_and(|l| l.eq_ignore_ascii_case("thumbnails"))
            })
            .map(|t| SubtitleTrack {
                language: t.lang.unwrap_or_else(|| "unknown".to_string()),
                url: t.url,
                is_default: t.default,
            })
            .collect();

        Self {
            video_url,
            is_segmented,
            subtitle_tracks,
            required_referer,
        }
    }
}
