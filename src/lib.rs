//! anidl core library
//!
//! Acquires anime episodes listed by a catalog API and reassembles each one
//! into a single local video file, with optional subtitles.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`selection`] - Episode selection expressions
//! - [`catalog`] - Catalog API client (search, episodes, servers, sources)
//! - [`stream`] - Episode to playable source, with audio fallback and retry
//! - [`manifest`] - HLS master/media playlist resolution
//! - [`download`] - HTTP fetching, retry policy, segment orchestration, naming
//! - [`assemble`] - Segment concatenation through an external multiplexer
//! - [`subtitles`] - Subtitle policy and downloads
//! - [`pipeline`] - Per-episode orchestration
//! - [`workspace`] - Run context, temp workspaces, and the outcome tally

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assemble;
pub mod catalog;
pub mod download;
pub mod manifest;
pub mod pipeline;
pub mod selection;
pub mod stream;
pub mod subtitles;
mod user_agent;
pub mod workspace;

// Re-export commonly used types
pub use assemble::{AssembleError, Assembler, EpisodeMetadata, FfmpegMultiplexer, Multiplexer};
pub use catalog::{
    AnimeInfo, AnimeSummary, AudioType, CatalogClient, CatalogError, EpisodeList, EpisodeRef,
};
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadError, FailureType, HttpClient,
    RetryDecision, RetryPolicy, SegmentFetcher, SegmentJob, SegmentReport, classify_error,
};
pub use manifest::{ManifestError, ManifestResolver, ManifestVariant, ResolvedPlaylist};
pub use pipeline::{EpisodeError, EpisodeOrchestrator, PipelineSettings};
pub use selection::{Selection, SelectionWarning, resolve_refs};
pub use stream::{ResolveNotice, ResolvedStream, StreamError, StreamResolver};
pub use subtitles::SubtitlePolicy;
pub use workspace::{AcquisitionResult, RunContext, RunTally, WorkspaceRegistry};
