//! HTTP client for the catalog JSON API.
//!
//! | Call | Endpoint |
//! |------|----------|
//! | search | `GET /search?q=<query>&page=1` |
//! | anime info | `GET /anime/<id>` |
//! | episodes | `GET /anime/<id>/episodes` |
//! | servers | `GET /episode/servers?animeEpisodeId=<id>` |
//! | sources | `GET /episode/sources?animeEpisodeId=<id>&server=<name>&category=<sub\|dub>` |

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::error::CatalogError;
use super::types::{
    AnimeInfo, AnimeSummary, AudioType, Envelope, EpisodeList, EpisodesData, InfoData,
    SearchData, ServerList, ServersData, SourcePayload, SourcesData,
};
use crate::download::client::build_client;
use crate::download::constants::CONNECT_TIMEOUT_SECS;
use crate::user_agent;

/// Overall timeout for a single catalog request.
pub const CATALOG_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one catalog API base URL.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    base: Url,
    request_timeout: Duration,
}

impl CatalogClient {
    /// Creates a client for `base_url` with the default connect timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidEndpoint`] when `base_url` is not an
    /// absolute http(s) URL, or [`CatalogError::Network`] when the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        Self::with_connect_timeout(base_url, CONNECT_TIMEOUT_SECS)
    }

    /// Creates a client with an explicit connect timeout in seconds.
    ///
    /// # Errors
    ///
    /// See [`CatalogClient::new`].
    pub fn with_connect_timeout(
        base_url: &str,
        connect_timeout_secs: u64,
    ) -> Result<Self, CatalogError> {
        let base = parse_base(base_url)?;
        let client = build_client(&user_agent::default_user_agent(), connect_timeout_secs)
            .map_err(|source| CatalogError::Network {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            base,
            request_timeout: CATALOG_REQUEST_TIMEOUT,
        })
    }

    /// Searches the catalog by free text.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on transport, status, or decode failures.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<AnimeSummary>, CatalogError> {
        let url = self.endpoint(&["search"], &[("q", query), ("page", "1")])?;
        let data: SearchData = self.get_json(url).await?;
        Ok(data.animes.into_iter().map(AnimeSummary::from).collect())
    }

    /// Fetches title info for an anime id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on transport, status, or decode failures.
    #[instrument(skip(self))]
    pub async fn anime_info(&self, anime_id: &str) -> Result<AnimeInfo, CatalogError> {
        let url = self.endpoint(&["anime", anime_id], &[])?;
        let data: InfoData = self.get_json(url).await?;
        Ok(AnimeInfo {
            id: data.anime.info.id,
            title: data.anime.info.name,
        })
    }

    /// Lists every episode of an anime, sorted by number.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on transport, status, or decode failures.
    #[instrument(skip(self))]
    pub async fn episodes(&self, anime_id: &str) -> Result<EpisodeList, CatalogError> {
        let url = self.endpoint(&["anime", anime_id, "episodes"], &[])?;
        let data: EpisodesData = self.get_json(url).await?;
        let list = EpisodeList::from(data);
        debug!(count = list.episodes.len(), total = list.total, "episodes listed");
        Ok(list)
    }

    /// Lists servers carrying an episode, grouped by audio type.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] on transport, status, or decode failures.
    #[instrument(skip(self))]
    pub async fn servers(&self, episode_id: &str) -> Result<ServerList, CatalogError> {
        let url = self.endpoint(&["episode", "servers"], &[("animeEpisodeId", episode_id)])?;
        let data: ServersData = self.get_json(url).await?;
        Ok(ServerList::from(data))
    }

    /// Requests the source payload for one episode/server/audio triple.
    ///
    /// A single attempt; retry is the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::EmptyPayload`] when the API answers without
    /// data, or another [`CatalogError`] on transport/decode failures.
    #[instrument(skip(self))]
    pub async fn sources(
        &self,
        episode_id: &str,
        server: &str,
        audio: AudioType,
    ) -> Result<SourcePayload, CatalogError> {
        let url = self.endpoint(
            &["episode", "sources"],
            &[
                ("animeEpisodeId", episode_id),
                ("server", server),
                ("category", audio.as_str()),
            ],
        )?;
        let data: SourcesData = self.get_json(url).await?;
        Ok(SourcePayload::from(data))
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, CatalogError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| CatalogError::InvalidEndpoint {
                    url: self.base.to_string(),
                })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        let url_text = url.to_string();
        debug!(url = %url_text, "catalog request");

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| transport_error(&url_text, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::HttpStatus {
                url: url_text,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&url_text, e))?;
        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|e| CatalogError::decode(&url_text, e.to_string()))?;

        if envelope.success == Some(false) {
            return Err(CatalogError::Api {
                url: url_text,
                message: envelope
                    .message
                    .unwrap_or_else(|| "no message".to_string()),
            });
        }

        envelope
            .data
            .ok_or(CatalogError::EmptyPayload { url: url_text })
    }
}

fn parse_base(base_url: &str) -> Result<Url, CatalogError> {
    let invalid = || CatalogError::InvalidEndpoint {
        url: base_url.to_string(),
    };
    let url = Url::parse(base_url.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(invalid());
    }
    Ok(url)
}

fn transport_error(url: &str, error: reqwest::Error) -> CatalogError {
    if error.is_timeout() {
        CatalogError::Timeout {
            url: url.to_string(),
        }
    } else {
        CatalogError::Network {
            url: url.to_string(),
            source: error,
        }
    }
}
