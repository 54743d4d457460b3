//! HLS manifest resolution: master playlist to an ordered segment list.
//!
//! A manifest with `#EXT-X-STREAM-INF` entries is a master playlist; one
//! variant is chosen and its media playlist fetched. Anything else is
//! treated as the media playlist itself.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::{DownloadError, HttpClient, RetryPolicy, classify_error, retry_with};

const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";

/// Errors that end manifest resolution for one episode.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// A playlist could not be fetched.
    #[error("failed to fetch playlist {url} after {attempts} attempt(s): {source}")]
    Fetch {
        /// Playlist URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Last fetch error.
        #[source]
        source: DownloadError,
    },

    /// A playlist or variant URL could not be parsed or joined.
    #[error("invalid playlist URL '{url}'")]
    InvalidUrl {
        /// The offending URL.
        url: String,
    },

    /// The master playlist could not be parsed.
    #[error("could not parse master playlist {url}")]
    Parse {
        /// Playlist URL.
        url: String,
    },

    /// Master playlist declared no usable variants.
    #[error("master playlist {url} has no variant streams")]
    NoVariants {
        /// Playlist URL.
        url: String,
    },

    /// Media playlist listed no segments.
    #[error("media playlist {url} has no segments")]
    EmptyPlaylist {
        /// Playlist URL.
        url: String,
    },
}

/// One quality rendition from a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestVariant {
    /// `WIDTHxHEIGHT`, plus ` NAME` when the playlist names the variant.
    pub resolution_label: String,
    /// Peak bandwidth in bits per second.
    pub bandwidth: u64,
    /// Absolute media playlist URL.
    pub media_url: String,
}

/// A media playlist resolved to absolute segment URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlaylist {
    /// Segment URLs in playlist order.
    pub segment_urls: Vec<String>,
    /// URL of the media playlist segments were resolved against.
    pub base_url: String,
    /// Variant chosen, if the manifest was a master playlist.
    pub variant: Option<ManifestVariant>,
}

/// Picks a variant by resolution keyword, else by bandwidth.
///
/// With a keyword that some label contains (case-insensitive), the
/// highest-bandwidth matching variant wins; otherwise the highest-bandwidth
/// variant overall. Ties keep the first encountered.
#[must_use]
pub fn select_variant<'a>(
    variants: &'a [ManifestVariant],
    resolution_keyword: Option<&str>,
) -> Option<&'a ManifestVariant> {
    let keyword = resolution_keyword
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty());

    if let Some(keyword) = keyword {
        let matched = highest_bandwidth(
            variants
                .iter()
                .filter(|v| v.resolution_label.to_lowercase().contains(&keyword)),
        );
        if matched.is_some() {
            return matched;
        }
        debug!(%keyword, "no variant matched resolution keyword");
    }

    highest_bandwidth(variants.iter())
}

fn highest_bandwidth<'a>(
    variants: impl Iterator<Item = &'a ManifestVariant>,
) -> Option<&'a ManifestVariant> {
    let mut best: Option<&ManifestVariant> = None;
    for variant in variants {
        if best.is_none_or(|b| variant.bandwidth > b.bandwidth) {
            best = Some(variant);
        }
    }
    best
}

/// True when the playlist text declares variant streams.
#[must_use]
pub fn is_master_playlist(text: &str) -> bool {
    text.lines().any(|line| line.trim_start().starts_with(STREAM_INF_TAG))
}

/// Parses master playlist variants, resolving each URI against `base`.
///
/// # Errors
///
/// Returns [`ManifestError::Parse`] when the text is not a master playlist.
pub fn parse_variants(text: &str, base: &Url) -> Result<Vec<ManifestVariant>, ManifestError> {
    let master = m3u8_rs::parse_master_playlist_res(text.as_bytes()).map_err(|_| {
        ManifestError::Parse {
            url: base.to_string(),
        }
    })?;

    let mut variants = Vec::with_capacity(master.variants.len());
    for stream in master.variants.iter().filter(|v| !v.is_i_frame) {
        let Ok(media_url) = base.join(stream.uri.trim()) else {
            warn!(uri = %stream.uri, "skipping variant with unresolvable URI");
            continue;
        };
        let mut label = stream
            .resolution
            .map(|r| format!("{}x{}", r.width, r.height))
            .unwrap_or_default();
        let name = stream
            .other_attributes
            .as_ref()
            .and_then(|attrs| attrs.get("NAME"))
            .map(|value| value.as_str().trim().to_string())
            .filter(|value| !value.is_empty());
        if let Some(name) = name {
            if !label.is_empty() {
                label.push(' ');
            }
            label.push_str(&name);
        }
        variants.push(ManifestVariant {
            resolution_label: label,
            bandwidth: stream.bandwidth,
            media_url: media_url.to_string(),
        });
    }
    Ok(variants)
}

/// Segment URLs from a media playlist: every non-blank line not starting
/// with `#`, resolved against `base`. Unresolvable lines are skipped.
#[must_use]
pub fn segment_urls(text: &str, base: &Url) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match base.join(line) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                warn!(line, error = %e, "skipping unresolvable segment reference");
                None
            }
        })
        .collect()
}

/// Fetches manifests and resolves them to segment lists.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    client: HttpClient,
    retry_policy: RetryPolicy,
    timeout: Option<Duration>,
}

impl ManifestResolver {
    /// Creates a resolver sharing `client`'s connection pool.
    #[must_use]
    pub fn new(client: HttpClient, retry_policy: RetryPolicy, timeout: Option<Duration>) -> Self {
        Self {
            client,
            retry_policy,
            timeout,
        }
    }

    /// Resolves `master_url` to an ordered segment list.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when a playlist cannot be fetched or parsed,
    /// the master has no variants, or the media playlist has no segments.
    #[instrument(skip(self, referer))]
    pub async fn resolve(
        &self,
        master_url: &str,
        referer: Option<&str>,
        resolution_keyword: Option<&str>,
    ) -> Result<ResolvedPlaylist, ManifestError> {
        let manifest_url = Url::parse(master_url).map_err(|_| ManifestError::InvalidUrl {
            url: master_url.to_string(),
        })?;
        let text = self.fetch(manifest_url.as_str(), referer).await?;

        if !is_master_playlist(&text) {
            debug!("manifest has no variants, treating it as the media playlist");
            return finish(text.as_str(), &manifest_url, None);
        }

        let variants = parse_variants(&text, &manifest_url)?;
        let variant = select_variant(&variants, resolution_keyword)
            .cloned()
            .ok_or_else(|| ManifestError::NoVariants {
                url: master_url.to_string(),
            })?;
        info!(
            label = %variant.resolution_label,
            bandwidth = variant.bandwidth,
            candidates = variants.len(),
            "variant selected"
        );

        let media_url = Url::parse(&variant.media_url).map_err(|_| ManifestError::InvalidUrl {
            url: variant.media_url.clone(),
        })?;
        let media_text = self.fetch(media_url.as_str(), referer).await?;
        finish(&media_text, &media_url, Some(variant))
    }

    async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<String, ManifestError> {
        let timeout = self.timeout;
        retry_with(&self.retry_policy, classify_error, |attempt| async move {
            debug!(url, attempt, "fetching playlist");
            self.client.fetch_text(url, referer, timeout).await
        })
        .await
        .map_err(|(source, attempts)| ManifestError::Fetch {
            url: url.to_string(),
            attempts,
            source,
        })
    }
}

fn finish(
    text: &str,
    base: &Url,
    variant: Option<ManifestVariant>,
) -> Result<ResolvedPlaylist, ManifestError> {
    let segment_urls = segment_urls(text, base);
    if segment_urls.is_empty() {
        return Err(ManifestError::EmptyPlaylist {
            url: base.to_string(),
        });
    }
    debug!(segments = segment_urls.len(), "media playlist parsed");
    Ok(ResolvedPlaylist {
        segment_urls,
        base_url: base.to_string(),
        variant,
    })
}
