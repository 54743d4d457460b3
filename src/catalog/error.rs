//! Error types for catalog API calls.

use thiserror::Error;

/// Errors returned by [`CatalogClient`](super::CatalogClient).
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The configured base URL cannot be used to build endpoint URLs.
    #[error(
        "invalid catalog endpoint '{url}'\n  \
         Suggestion: set --api-url or ANIDL_API_URL to an http(s) base URL"
    )]
    InvalidEndpoint {
        /// The rejected base URL.
        url: String,
    },

    /// Transport-level failure.
    #[error("catalog request to {url} failed: {source}")]
    Network {
        /// Request URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out.
    #[error("catalog request to {url} timed out")]
    Timeout {
        /// Request URL.
        url: String,
    },

    /// Non-2xx response.
    #[error("catalog returned HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Body was not the expected JSON shape.
    #[error("could not decode catalog response from {url}: {message}")]
    Decode {
        /// Request URL.
        url: String,
        /// Decoder message.
        message: String,
    },

    /// The API reported `success: false`.
    #[error("catalog reported failure for {url}: {message}")]
    Api {
        /// Request URL.
        url: String,
        /// Message from the API, if any.
        message: String,
    },

    /// A 2xx response carried no `data` payload.
    #[error("catalog returned an empty payload for {url}")]
    EmptyPayload {
        /// Request URL.
        url: String,
    },
}

impl CatalogError {
    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether a source request that failed this way is worth retrying.
    ///
    /// The source call treats transport errors, bad statuses, explicit API
    /// failures, and empty payloads as transient. Decode errors and invalid
    /// endpoints are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::HttpStatus { .. }
                | Self::Api { .. }
                | Self::EmptyPayload { .. }
        )
    }
}
