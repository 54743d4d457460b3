//! Subtitle track selection and download.
//!
//! Subtitles are fetched after the video succeeds and never fail an episode.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::catalog::SubtitleTrack;
use crate::download::{
    HttpClient, MAX_LANGUAGE_BYTES, RetryPolicy, classify_error, episode_subtitle_path, retry_with,
    truncate_component,
};

/// Language preferred by [`SubtitlePolicy::Default`] unless configured.
pub const DEFAULT_SUBTITLE_LANGUAGE: &str = "English";

/// Which subtitle tracks to download.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubtitlePolicy {
    /// No subtitles.
    None,
    /// One track: the preferred language, else the default-marked track,
    /// else the first.
    #[default]
    Default,
    /// Tracks whose label equals or starts with one of these (case-insensitive).
    Languages(Vec<String>),
    /// Every track.
    All,
}

impl FromStr for SubtitlePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" => Err("subtitle policy must not be empty".to_string()),
            "none" | "off" => Ok(Self::None),
            "default" => Ok(Self::Default),
            "all" => Ok(Self::All),
            _ => {
                let languages: Vec<String> = trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                if languages.is_empty() {
                    Err(format!("invalid subtitle policy '{value}'"))
                } else {
                    Ok(Self::Languages(languages))
                }
            }
        }
    }
}

impl fmt::Display for SubtitlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Default => f.write_str("default"),
            Self::All => f.write_str("all"),
            Self::Languages(langs) => f.write_str(&langs.join(",")),
        }
    }
}

/// Tracks chosen by `policy`, in catalog order.
#[must_use]
pub fn select_tracks<'a>(
    tracks: &'a [SubtitleTrack],
    policy: &SubtitlePolicy,
    preferred_language: &str,
) -> Vec<&'a SubtitleTrack> {
    match policy {
        SubtitlePolicy::None => Vec::new(),
        SubtitlePolicy::All => tracks.iter().collect(),
        SubtitlePolicy::Default => tracks
            .iter()
            .find(|t| label_matches(&t.language, preferred_language))
            .or_else(|| tracks.iter().find(|t| t.is_default))
            .or_else(|| tracks.first())
            .into_iter()
            .collect(),
        SubtitlePolicy::Languages(wanted) => tracks
            .iter()
            .filter(|t| wanted.iter().any(|w| label_matches(&t.language, w)))
            .collect(),
    }
}

fn label_matches(label: &str, wanted: &str) -> bool {
    let label = label.trim().to_lowercase();
    let wanted = wanted.trim().to_lowercase();
    !wanted.is_empty() && (label == wanted || label.starts_with(&wanted))
}

/// Downloads subtitle tracks next to an episode's video.
#[derive(Debug, Clone)]
pub struct SubtitleFetcher {
    client: HttpClient,
    retry_policy: RetryPolicy,
    timeout: Option<Duration>,
}

impl SubtitleFetcher {
    /// Creates a fetcher sharing `client`'s connection pool.
    #[must_use]
    pub fn new(client: HttpClient, retry_policy: RetryPolicy, timeout: Option<Duration>) -> Self {
        Self {
            client,
            retry_policy,
            timeout,
        }
    }

    /// Downloads each track to `<dir>/<base>.<lang>.vtt`, returning the paths
    /// written. Failures are logged and skipped. Tracks whose labels map to
    /// the same file get `-2`, `-3`, ... appended to the language.
    pub async fn fetch(
        &self,
        tracks: &[&SubtitleTrack],
        dir: &Path,
        base_name: &str,
        referer: Option<&str>,
    ) -> Vec<PathBuf> {
        let mut written = Vec::new();
        let mut claimed = HashSet::new();
        for track in tracks {
            let dest = unique_subtitle_path(dir, base_name, &track.language, &mut claimed);
            let timeout = self.timeout;
            let result = retry_with(&self.retry_policy, classify_error, |_| {
                let dest = dest.clone();
                async move {
                    self.client
                        .download_to_path(&track.url, referer, &dest, timeout)
                        .await
                }
            })
            .await;
            match result {
                Ok(bytes) => {
                    info!(
                        language = %track.language,
                        bytes,
                        path = %dest.display(),
                        "subtitle saved"
                    );
                    written.push(dest);
                }
                Err((error, attempts)) => {
                    warn!(
                        language = %track.language,
                        url = %track.url,
                        attempts,
                        error = %error,
                        "subtitle download failed"
                    );
                }
            }
        }
        written
    }
}

fn unique_subtitle_path(
    dir: &Path,
    base_name: &str,
    language: &str,
    claimed: &mut HashSet<PathBuf>,
) -> PathBuf {
    let mut dest = episode_subtitle_path(dir, base_name, language);
    // Shortened so the counter survives the language length cap.
    let stem = truncate_component(language, MAX_LANGUAGE_BYTES - 8);
    let mut n = 2;
    while !claimed.insert(dest.clone()) {
        dest = episode_subtitle_path(dir, base_name, &format!("{stem}-{n}"));
        n += 1;
    }
    dest
}
