//! Stream resolution: episode id + preferences to a playable media source.
//!
//! Servers are listed per audio type, one server is chosen, and its source
//! payload is requested with a fixed-delay retry. The only substitution is
//! dub to sub when no dub server exists.

use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::catalog::{AudioType, CatalogClient, CatalogError, SourcePayload};
use crate::download::{FailureType, RetryPolicy, retry_with};

/// Errors that end stream resolution for one episode.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// No server carries the episode in the usable audio type.
    #[error("no {audio} servers available for episode '{episode_id}'")]
    NoServers {
        /// Catalog episode id.
        episode_id: String,
        /// Audio type that was searched last.
        audio: AudioType,
    },

    /// The source payload had no video URL.
    #[error("source from server '{server}' has no video URL")]
    MissingVideoUrl {
        /// Server that was queried.
        server: String,
    },

    /// Catalog request failed (after retries, for the source call).
    #[error("catalog error while resolving stream (after {attempts} attempt(s)): {source}")]
    Catalog {
        /// Attempts made.
        attempts: u32,
        /// Last catalog error.
        #[source]
        source: CatalogError,
    },
}

/// Non-fatal substitutions made while resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveNotice {
    /// Dub was requested but only sub servers exist.
    AudioFallback {
        /// Audio type requested.
        requested: AudioType,
        /// Audio type used.
        used: AudioType,
    },
    /// No server name contained the keyword; the unfiltered list was used.
    ServerKeywordUnmatched {
        /// Keyword that matched nothing.
        keyword: String,
    },
}

impl fmt::Display for ResolveNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AudioFallback { requested, used } => {
                write!(f, "no {requested} servers; falling back to {used}")
            }
            Self::ServerKeywordUnmatched { keyword } => {
                write!(f, "no server matched '{keyword}'; using the first available server")
            }
        }
    }
}

/// A resolved, playable source for one episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStream {
    /// Source payload from the catalog.
    pub source: SourcePayload,
    /// Audio type actually used.
    pub audio: AudioType,
    /// Server name chosen.
    pub server: String,
    /// Substitutions made along the way.
    pub notices: Vec<ResolveNotice>,
}

impl ResolvedStream {
    /// Referer for media fetches: the override when given, else the one the
    /// catalog requires.
    #[must_use]
    pub fn effective_referer<'a>(&'a self, override_referer: Option<&'a str>) -> Option<&'a str> {
        override_referer
            .filter(|value| !value.trim().is_empty())
            .or(self.source.required_referer.as_deref())
    }
}

/// Resolves episode ids to sources through the catalog.
#[derive(Debug, Clone)]
pub struct StreamResolver {
    catalog: CatalogClient,
    source_retry: RetryPolicy,
}

impl StreamResolver {
    /// Creates a resolver using the catalog source retry policy (3 attempts,
    /// 5 s apart).
    #[must_use]
    pub fn new(catalog: CatalogClient) -> Self {
        Self::with_retry_policy(catalog, RetryPolicy::catalog_source())
    }

    /// Creates a resolver with an explicit source retry policy.
    #[must_use]
    pub fn with_retry_policy(catalog: CatalogClient, source_retry: RetryPolicy) -> Self {
        Self {
            catalog,
            source_retry,
        }
    }

    /// Resolves one episode to a playable source.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] when no server exists, the catalog fails, or
    /// the source carries no video URL.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        episode_id: &str,
        audio: AudioType,
        server_keyword: Option<&str>,
    ) -> Result<ResolvedStream, StreamError> {
        let servers = self
            .catalog
            .servers(episode_id)
            .await
            .map_err(|source| StreamError::Catalog {
                attempts: 1,
                source,
            })?;

        let mut notices = Vec::new();
        let mut used_audio = audio;
        if audio == AudioType::Dub && servers.dub.is_empty() {
            used_audio = AudioType::Sub;
            notices.push(ResolveNotice::AudioFallback {
                requested: audio,
                used: used_audio,
            });
        }

        let candidates = servers.for_audio(used_audio);
        let (server, keyword_notice) = pick_server(candidates, server_keyword).ok_or_else(|| {
            StreamError::NoServers {
                episode_id: episode_id.to_string(),
                audio: used_audio,
            }
        })?;
        notices.extend(keyword_notice);

        for notice in &notices {
            warn!(episode_id, %notice, "stream resolution notice");
        }
        debug!(episode_id, server = %server, audio = %used_audio, "server chosen");

        let source = retry_with(&self.source_retry, classify_catalog_error, |attempt| {
            let server = server.clone();
            async move {
                debug!(episode_id, server = %server, attempt, "requesting source");
                self.catalog.sources(episode_id, &server, used_audio).await
            }
        })
        .await
        .map_err(|(source, attempts)| StreamError::Catalog { attempts, source })?;

        if source.video_url.trim().is_empty() {
            return Err(StreamError::MissingVideoUrl { server });
        }

        info!(
            episode_id,
            server = %server,
            audio = %used_audio,
            segmented = source.is_segmented,
            subtitles = source.subtitle_tracks.len(),
            "stream resolved"
        );

        Ok(ResolvedStream {
            source,
            audio: used_audio,
            server,
            notices,
        })
    }
}

/// Picks the first server whose name contains `keyword` (case-insensitive),
/// falling back to the first server overall.
fn pick_server(
    servers: &[String],
    keyword: Option<&str>,
) -> Option<(String, Option<ResolveNotice>)> {
    let first = servers.first()?;
    let Some(keyword) = keyword.map(str::trim).filter(|k| !k.is_empty()) else {
        return Some((first.clone(), None));
    };
    let needle = keyword.to_lowercase();
    match servers.iter().find(|name| name.to_lowercase().contains(&needle)) {
        Some(name) => Some((name.clone(), None)),
        None => Some((
            first.clone(),
            Some(ResolveNotice::ServerKeywordUnmatched {
                keyword: keyword.to_string(),
            }),
        )),
    }
}

fn classify_catalog_error(error: &CatalogError) -> FailureType {
    if error.is_retryable() {
        FailureType::Transient
    } else {
        FailureType::Permanent
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_pick_server_matches_keyword_case_insensitively() {
        let servers = names(&["hd-1", "MegaCloud", "hd-2"]);
        let (server, notice) = pick_server(&servers, Some("mega")).unwrap();
        assert_eq!(server, "MegaCloud");
        assert!(notice.is_none());
    }

    #[test]
    fn test_pick_server_unmatched_keyword_uses_first() {
        let servers = names(&["hd-1", "hd-2"]);
        let (server, notice) = pick_server(&servers, Some("vid")).unwrap();
        assert_eq!(server, "hd-1");
        assert_eq!(
            notice,
            Some(ResolveNotice::ServerKeywordUnmatched {
                keyword: "vid".to_string()
            })
        );
    }

    #[test]
    fn test_pick_server_empty_list() {
        assert!(pick_server(&[], Some("hd")).is_none());
    }

    #[test]
    fn test_effective_referer_prefers_override() {
        let stream = ResolvedStream {
            source: SourcePayload {
                required_referer: Some("https://api-referer.example/".to_string()),
                ..SourcePayload::default()
            },
            audio: AudioType::Sub,
            server: "hd-1".to_string(),
            notices: Vec::new(),
        };
        assert_eq!(
            stream.effective_referer(Some("https://mine.example/")),
            Some("https://mine.example/")
        );
        assert_eq!(
            stream.effective_referer(None),
            Some("https://api-referer.example/")
        );
        assert_eq!(
            stream.effective_referer(Some("  ")),
            Some("https://api-referer.example/")
        );
    }

    #[test]
    fn test_notice_messages() {
        let notice = ResolveNotice::AudioFallback {
            requested: AudioType::Dub,
            used: AudioType::Sub,
        };
        assert_eq!(notice.to_string(), "no dub servers; falling back to sub");
    }
}
