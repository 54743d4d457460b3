//! Catalog API access: search, episode listings, servers, and sources.

mod client;
mod error;
mod types;

pub use client::{CATALOG_REQUEST_TIMEOUT, CatalogClient};
pub use error::CatalogError;
pub use types::{
    AnimeInfo, AnimeSummary, AudioType, EpisodeList, EpisodeRef, ServerList, SourcePayload,
    SubtitleTrack,
};
