//! HTTP fetching for playlists, segments, direct files, and subtitles.
//!
//! # Features
//!
//! - Streaming downloads with partial-file cleanup on error
//! - Optional `Referer` and per-request timeout on every fetch
//! - Fixed-delay retry driven by [`classify_error`]
//! - Bounded-parallel segment fetching with index-ordered results
//! - Deterministic output file naming
//!
//! # Example
//!
//! ```no_run
//! use anidl_core::download::{HttpClient, RetryPolicy, SegmentFetcher, SegmentJob};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let urls = vec!["https://cdn.example/seg-0.ts".to_string()];
//! let jobs = SegmentJob::plan(&urls, Path::new("/tmp/ws"));
//! let fetcher = SegmentFetcher::new(16, RetryPolicy::default(), None)?;
//! let report = fetcher.fetch_all(&client, &jobs, None).await;
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

pub(crate) mod client;
pub(crate) mod constants;
mod error;
mod filename;
mod retry;
mod segments;

pub use client::HttpClient;
pub use constants::{CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use error::DownloadError;
pub use filename::{
    MAX_DIR_NAME_BYTES, MAX_LANGUAGE_BYTES, MAX_TITLE_BYTES, anime_output_dir, episode_base_name,
    episode_subtitle_path, episode_video_path, padding_width, partial_path,
    sanitize_filename_component, truncate_component,
};
pub use retry::{
    DEFAULT_FETCH_RETRY_DELAY, DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy,
    SOURCE_RETRY_DELAY, classify_error, retry_with,
};
pub use segments::{FetchError, SegmentFailure, SegmentFetcher, SegmentJob, SegmentReport};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
