//! HTTP client wrapper for fetching playlists, segments, and files.
//!
//! This module provides the `HttpClient` struct which handles text fetches
//! and streaming downloads with an optional `Referer`, per-request timeouts,
//! and cleanup of partial files on error.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::REFERER;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::CONNECT_TIMEOUT_SECS;
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for media fetches.
///
/// Created once per run and cloned freely; clones share the connection pool.
///
/// # Example
///
/// ```no_run
/// use anidl_core::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let playlist = client
///     .fetch_text("https://cdn.example/master.m3u8", Some("https://player.example/"), None)
///     .await?;
/// println!("{playlist}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with the default connect timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_connect_timeout(CONNECT_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with an explicit connect timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_connect_timeout(connect_timeout_secs: u64) -> Self {
        let client = build_client(&user_agent::default_user_agent(), connect_timeout_secs)
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches a URL and returns its body as text.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the URL is invalid, the request fails or
    /// times out, the server answers with a non-2xx status, or the body is
    /// not UTF-8.
    #[instrument(level = "debug", skip(self, referer))]
    pub async fn fetch_text(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<String, DownloadError> {
        let response = self.send_get(url, referer, timeout).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(url, e))?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DownloadError::invalid_text(url))
    }

    /// Streams a URL to `dest`, returning the number of bytes written.
    ///
    /// On any error after the file was created the partial file is removed,
    /// so a failed call never leaves a file at `dest`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport, status, or filesystem failures.
    #[instrument(level = "debug", skip(self, referer), fields(dest = %dest.display()))]
    pub async fn download_to_path(
        &self,
        url: &str,
        referer: Option<&str>,
        dest: &Path,
        timeout: Option<Duration>,
    ) -> Result<u64, DownloadError> {
        let response = self.send_get(url, referer, timeout).await?;

        let mut file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;

        let stream_result = stream_to_file(&mut file, response, url, dest).await;
        drop(file);

        if stream_result.is_err() {
            debug!(path = %dest.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(dest).await;
        }

        stream_result
    }

    async fn send_get(
        &self,
        url: &str,
        referer: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(parsed);
        if let Some(referer) = referer.filter(|value| !value.is_empty()) {
            request = request.header(REFERER, referer);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(url, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        Ok(response)
    }
}

/// Builds the shared reqwest client: connect timeout, gzip, user agent,
/// cookie store, default redirect policy.
///
/// # Errors
///
/// Returns the reqwest builder error if the TLS backend cannot initialise.
pub(crate) fn build_client(
    user_agent: &str,
    connect_timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .gzip(true)
        .cookie_store(true)
        .user_agent(user_agent)
        .build()
}

fn map_transport_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| map_transport_error(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_text_sends_referer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/master.m3u8"))
            .and(header("referer", "https://player.example/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let body = client
            .fetch_text(
                &format!("{}/master.m3u8", server.uri()),
                Some("https://player.example/"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(body, "#EXTM3U\n");
    }

    #[tokio::test]
    async fn test_fetch_text_maps_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let err = client
            .fetch_text(&format!("{}/missing", server.uri()), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_text_rejects_invalid_url() {
        let client = HttpClient::new();
        let err = client.fetch_text("not a url", None, None).await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_download_to_path_writes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/seg-0.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"segment-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("seg_00000.ts");
        let client = HttpClient::new();
        let written = client
            .download_to_path(&format!("{}/seg-0.ts", server.uri()), None, &dest, None)
            .await
            .unwrap();

        assert_eq!(written, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"segment-bytes");
    }

    #[tokio::test]
    async fn test_download_to_path_timeout_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("seg_00000.ts");
        let client = HttpClient::new();
        let err = client
            .download_to_path(
                &format!("{}/slow.ts", server.uri()),
                None,
                &dest,
                Some(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Timeout { .. }), "got {err:?}");
        assert!(!dest.exists());
    }
}
