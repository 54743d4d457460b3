//! Episode orchestrator: one episode from catalog id to files on disk.
//!
//! ```text
//! Pending -> SkipExisting                          -> SkippedExists
//!         -> Resolving -> Manifest | Direct
//!                      -> Fetching -> Assembling   -> Succeeded | Failed
//! ```
//!
//! Each episode gets its own workspace, removed when the episode finishes.
//! Failures are returned as [`AcquisitionResult::Failed`] and never abort
//! the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::assemble::{AssembleError, Assembler, EpisodeMetadata, promote};
use crate::catalog::{AudioType, CatalogClient, EpisodeRef};
use crate::download::{
    DEFAULT_CONCURRENCY, DownloadError, FetchError, HttpClient, RetryPolicy, SegmentFetcher,
    SegmentJob, anime_output_dir, classify_error, episode_base_name, episode_video_path,
    partial_path, retry_with,
};
use crate::manifest::{ManifestError, ManifestResolver};
use crate::stream::{ResolvedStream, StreamError, StreamResolver};
use crate::subtitles::{DEFAULT_SUBTITLE_LANGUAGE, SubtitleFetcher, SubtitlePolicy, select_tracks};
use crate::workspace::{AcquisitionResult, RunContext, Workspace};

/// Errors that fail one episode.
#[derive(Debug, thiserror::Error)]
pub enum EpisodeError {
    /// Stream resolution failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Manifest resolution failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Some segments could not be fetched.
    #[error("{failed} of {total} segments failed to download")]
    SegmentsIncomplete {
        /// Failed segment count.
        failed: usize,
        /// Total segment count.
        total: usize,
    },

    /// Assembly failed.
    #[error(transparent)]
    Assemble(#[from] AssembleError),

    /// Direct (non-segmented) download failed.
    #[error("direct download failed after {attempts} attempt(s): {source}")]
    Direct {
        /// Attempts made.
        attempts: u32,
        /// Last error.
        #[source]
        source: DownloadError,
    },

    /// Workspace or output directory could not be prepared.
    #[error("could not prepare {path}: {source}")]
    Filesystem {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Per-run acquisition settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Output root; each anime gets a subdirectory.
    pub output_root: PathBuf,
    /// Audio preference.
    pub audio: AudioType,
    /// Server keyword filter.
    pub server_keyword: Option<String>,
    /// Resolution keyword for variant selection.
    pub resolution_keyword: Option<String>,
    /// Subtitle policy.
    pub subtitles: SubtitlePolicy,
    /// Language preferred by the default subtitle policy.
    pub subtitle_language: String,
    /// Referer replacing the catalog's, when set.
    pub referer_override: Option<String>,
    /// Segment fetch concurrency.
    pub concurrency: usize,
    /// Overall timeout for each segment/file request.
    pub segment_timeout: Option<Duration>,
    /// Retry policy for playlists, segments, direct files, and subtitles.
    pub fetch_retry: RetryPolicy,
    /// Retry policy for catalog source requests.
    pub source_retry: RetryPolicy,
    /// Draw a segment progress bar.
    pub show_progress: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            audio: AudioType::Sub,
            server_keyword: None,
            resolution_keyword: None,
            subtitles: SubtitlePolicy::Default,
            subtitle_language: DEFAULT_SUBTITLE_LANGUAGE.to_string(),
            referer_override: None,
            concurrency: DEFAULT_CONCURRENCY,
            segment_timeout: None,
            fetch_retry: RetryPolicy::default(),
            source_retry: RetryPolicy::catalog_source(),
            show_progress: false,
        }
    }
}

/// Where one episode's files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodePaths {
    /// Anime directory.
    pub dir: PathBuf,
    /// File base name without extension.
    pub base_name: String,
    /// Final video path.
    pub video: PathBuf,
}

/// Composes stream, manifest, segment, assembly, and subtitle stages.
#[derive(Debug, Clone)]
pub struct EpisodeOrchestrator {
    streams: StreamResolver,
    manifests: ManifestResolver,
    fetcher: SegmentFetcher,
    assembler: Assembler,
    subtitles: SubtitleFetcher,
    client: HttpClient,
    settings: PipelineSettings,
}

impl EpisodeOrchestrator {
    /// Builds the pipeline around shared clients.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidConcurrency`] for a concurrency outside
    /// `1..=100`.
    pub fn new(
        catalog: CatalogClient,
        client: HttpClient,
        assembler: Assembler,
        settings: PipelineSettings,
    ) -> Result<Self, FetchError> {
        let fetcher = SegmentFetcher::new(
            settings.concurrency,
            settings.fetch_retry.clone(),
            settings.segment_timeout,
        )?
        .with_progress(settings.show_progress);
        Ok(Self {
            streams: StreamResolver::with_retry_policy(catalog, settings.source_retry.clone()),
            manifests: ManifestResolver::new(
                client.clone(),
                settings.fetch_retry.clone(),
                settings.segment_timeout,
            ),
            subtitles: SubtitleFetcher::new(
                client.clone(),
                settings.fetch_retry.clone(),
                settings.segment_timeout,
            ),
            fetcher,
            assembler,
            client,
            settings,
        })
    }

    /// Deterministic output location for an episode.
    #[must_use]
    pub fn paths(
        &self,
        anime_title: &str,
        episode: &EpisodeRef,
        total_episodes: usize,
    ) -> EpisodePaths {
        let dir = anime_output_dir(&self.settings.output_root, anime_title);
        let base_name = episode_base_name(episode.number, &episode.title, total_episodes);
        let video = episode_video_path(&dir, &base_name);
        EpisodePaths {
            dir,
            base_name,
            video,
        }
    }

    /// Acquires one episode and records the result in `ctx`.
    #[instrument(skip(self, ctx, episode), fields(episode = episode.number))]
    pub async fn acquire(
        &self,
        ctx: &mut RunContext,
        anime_title: &str,
        episode: &EpisodeRef,
        total_episodes: usize,
    ) -> AcquisitionResult {
        let result = match self.try_acquire(ctx, anime_title, episode, total_episodes).await {
            Ok(result) => result,
            Err(e) => {
                error!(episode = episode.number, error = %e, "episode failed");
                AcquisitionResult::Failed(e.to_string())
            }
        };
        ctx.tally.record(episode.number, &result);
        result
    }

    async fn try_acquire(
        &self,
        ctx: &RunContext,
        anime_title: &str,
        episode: &EpisodeRef,
        total_episodes: usize,
    ) -> Result<AcquisitionResult, EpisodeError> {
        let paths = self.paths(anime_title, episode, total_episodes);
        if tokio::fs::try_exists(&paths.video).await.unwrap_or(false) {
            info!(path = %paths.video.display(), "output exists, skipping");
            return Ok(AcquisitionResult::SkippedExists);
        }

        let stream = self
            .streams
            .resolve(
                &episode.stream_id,
                self.settings.audio,
                self.settings.server_keyword.as_deref(),
            )
            .await?;
        let referer = stream.effective_referer(self.settings.referer_override.as_deref());

        tokio::fs::create_dir_all(&paths.dir)
            .await
            .map_err(|source| EpisodeError::Filesystem {
                path: paths.dir.clone(),
                source,
            })?;
        let workspace = ctx
            .workspaces
            .create(&format!("ep{}", episode.number))
            .map_err(|source| EpisodeError::Filesystem {
                path: std::env::temp_dir(),
                source,
            })?;

        let metadata = EpisodeMetadata::new(anime_title, episode.number, &episode.title);
        if stream.source.is_segmented {
            self.fetch_segmented(&stream, referer, &workspace, &metadata, &paths.video)
                .await?;
        } else {
            self.fetch_direct(&stream.source.video_url, referer, &paths.video)
                .await?;
        }
        drop(workspace);

        self.fetch_subtitles(&stream, referer, &paths).await;
        info!(path = %paths.video.display(), "episode complete");
        Ok(AcquisitionResult::Succeeded)
    }

    async fn fetch_segmented(
        &self,
        stream: &ResolvedStream,
        referer: Option<&str>,
        workspace: &Workspace,
        metadata: &EpisodeMetadata,
        output: &Path,
    ) -> Result<(), EpisodeError> {
        let playlist = self
            .manifests
            .resolve(
                &stream.source.video_url,
                referer,
                self.settings.resolution_keyword.as_deref(),
            )
            .await?;

        let jobs = SegmentJob::plan(&playlist.segment_urls, workspace.path());
        let report = self.fetcher.fetch_all(&self.client, &jobs, referer).await;
        if !report.is_complete() {
            for failure in report.failures() {
                debug!(
                    index = failure.index,
                    url = %failure.url,
                    error = %failure.error,
                    "segment failure"
                );
            }
            return Err(EpisodeError::SegmentsIncomplete {
                failed: report.total() - report.succeeded(),
                total: report.total(),
            });
        }

        let segment_paths: Vec<PathBuf> = jobs.into_iter().map(|job| job.local_path).collect();
        self.assembler
            .assemble(workspace.path(), &segment_paths, metadata, output)
            .await?;
        Ok(())
    }

    async fn fetch_direct(
        &self,
        url: &str,
        referer: Option<&str>,
        output: &Path,
    ) -> Result<(), EpisodeError> {
        let part = partial_path(output);
        let timeout = self.settings.segment_timeout;
        let bytes = retry_with(&self.settings.fetch_retry, classify_error, |attempt| {
            let part = part.clone();
            async move {
                debug!(url, attempt, "direct download");
                self.client.download_to_path(url, referer, &part, timeout).await
            }
        })
        .await
        .map_err(|(source, attempts)| EpisodeError::Direct { attempts, source })?;

        promote(&part, output).await?;
        info!(bytes, "direct download complete");
        Ok(())
    }

    async fn fetch_subtitles(
        &self,
        stream: &ResolvedStream,
        referer: Option<&str>,
        paths: &EpisodePaths,
    ) {
        let tracks = select_tracks(
            &stream.source.subtitle_tracks,
            &self.settings.subtitles,
            &self.settings.subtitle_language,
        );
        if tracks.is_empty() {
            if self.settings.subtitles != SubtitlePolicy::None
                && !stream.source.subtitle_tracks.is_empty()
            {
                warn!(policy = %self.settings.subtitles, "no subtitle track matched");
            }
            return;
        }
        let written = self
            .subtitles
            .fetch(&tracks, &paths.dir, &paths.base_name, referer)
            .await;
        debug!(requested = tracks.len(), written = written.len(), "subtitles done");
    }
}
