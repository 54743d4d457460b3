//! Segment fetch orchestrator: bounded-parallel download of an ordered
//! segment list with per-segment retry.
//!
//! # Concurrency Model
//!
//! - Each segment runs in its own Tokio task
//! - A semaphore permit is acquired before spawning each task
//! - Permits are released automatically when the task completes (RAII)
//! - Outcomes land in a slice pre-sized to the job count, addressed by job
//!   index, so completion order never affects assembly order
//!
//! A segment that exhausts its retries leaves no file behind. Any failure makes
//! the report incomplete, and callers must not assemble an incomplete set.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::retry::{RetryPolicy, classify_error, retry_with};
use super::{DownloadError, HttpClient};

/// Error type for segment fetcher construction.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// One segment to fetch: where it comes from and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentJob {
    /// Position in the media playlist.
    pub index: usize,
    /// Absolute segment URL.
    pub source_url: String,
    /// Destination inside the episode workspace.
    pub local_path: PathBuf,
}

impl SegmentJob {
    /// Local file name for the segment at `index`.
    #[must_use]
    pub fn file_name(index: usize) -> String {
        format!("seg_{index:05}.ts")
    }

    /// Plans one job per URL, in playlist order, all under `dir`.
    #[must_use]
    pub fn plan(urls: &[String], dir: &Path) -> Vec<Self> {
        urls.iter()
            .enumerate()
            .map(|(index, url)| Self {
                index,
                source_url: url.clone(),
                local_path: dir.join(Self::file_name(index)),
            })
            .collect()
    }
}

/// A segment that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFailure {
    /// Job index of the failed segment.
    pub index: usize,
    /// The segment URL.
    pub url: String,
    /// Display form of the last error.
    pub error: String,
    /// Attempts made before giving up.
    pub attempts: u32,
}

/// Aggregate outcome of [`SegmentFetcher::fetch_all`].
#[derive(Debug, Clone, Default)]
pub struct SegmentReport {
    total: usize,
    succeeded: usize,
    failures: Vec<SegmentFailure>,
}

impl SegmentReport {
    /// Number of jobs submitted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of segments written successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Failed segments in job order.
    #[must_use]
    pub fn failures(&self) -> &[SegmentFailure] {
        &self.failures
    }

    /// True when every job succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total
    }
}

/// Bounded-parallel segment downloader.
#[derive(Debug, Clone)]
pub struct SegmentFetcher {
    concurrency: usize,
    retry_policy: RetryPolicy,
    per_item_timeout: Option<Duration>,
    show_progress: bool,
}

impl SegmentFetcher {
    /// Creates a fetcher with the given worker ceiling, retry policy, and
    /// optional overall timeout per segment request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidConcurrency`] outside `1..=100`.
    #[instrument(level = "debug", skip(retry_policy))]
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        per_item_timeout: Option<Duration>,
    ) -> Result<Self, FetchError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(FetchError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            "creating segment fetcher"
        );

        Ok(Self {
            concurrency,
            retry_policy,
            per_item_timeout,
            show_progress: false,
        })
    }

    /// Enables a progress bar on stderr (drawn only when stderr is a terminal).
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetches every job, returning aggregate success/failure counts.
    ///
    /// Individual failures never abort the batch; they are reported.
    #[instrument(skip(self, client, jobs, referer), fields(jobs = jobs.len()))]
    pub async fn fetch_all(
        &self,
        client: &HttpClient,
        jobs: &[SegmentJob],
        referer: Option<&str>,
    ) -> SegmentReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let progress = self.progress_bar(jobs.len());
        let mut outcomes: Vec<Option<Result<(), SegmentFailure>>> = vec![None; jobs.len()];
        let mut handles = Vec::with_capacity(jobs.len());

        for (slot, job) in jobs.iter().enumerate() {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                outcomes[slot] = Some(Err(SegmentFailure {
                    index: job.index,
                    url: job.source_url.clone(),
                    error: "worker pool closed".to_string(),
                    attempts: 0,
                }));
                continue;
            };

            let client = client.clone();
            let job = job.clone();
            let referer = referer.map(str::to_string);
            let policy = self.retry_policy.clone();
            let timeout = self.per_item_timeout;
            let progress = progress.clone();

            handles.push((
                slot,
                tokio::spawn(async move {
                    let _permit = permit;
                    let result =
                        fetch_one(&client, &job, referer.as_deref(), &policy, timeout).await;
                    progress.inc(1);
                    result
                }),
            ));
        }

        for (slot, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "segment task panicked");
                    Err(SegmentFailure {
                        index: jobs[slot].index,
                        url: jobs[slot].source_url.clone(),
                        error: format!("task failed: {e}"),
                        attempts: 0,
                    })
                }
            };
            outcomes[slot] = Some(outcome);
        }
        progress.finish_and_clear();

        let mut report = SegmentReport {
            total: jobs.len(),
            ..SegmentReport::default()
        };
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                Ok(()) => report.succeeded += 1,
                Err(failure) => report.failures.push(failure),
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failures.len(),
            total = report.total,
            "segment fetch complete"
        );
        report
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        let bar = ProgressBar::with_draw_target(
            Some(total as u64),
            if self.show_progress {
                ProgressDrawTarget::stderr()
            } else {
                ProgressDrawTarget::hidden()
            },
        );
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} segments ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}

/// Fetches one segment with retry; removes any partial file on failure.
async fn fetch_one(
    client: &HttpClient,
    job: &SegmentJob,
    referer: Option<&str>,
    policy: &RetryPolicy,
    timeout: Option<Duration>,
) -> Result<(), SegmentFailure> {
    let result = retry_with(policy, classify_error, |attempt| async move {
        debug!(index = job.index, attempt, "fetching segment");
        client
            .download_to_path(&job.source_url, referer, &job.local_path, timeout)
            .await
    })
    .await;

    match result {
        Ok(_) => Ok(()),
        Err((error, attempts)) => {
            remove_partial(&job.local_path, &error).await;
            warn!(
                index = job.index,
                url = %job.source_url,
                attempts,
                error = %error,
                "segment failed after all attempts"
            );
            Err(SegmentFailure {
                index: job.index,
                url: job.source_url.clone(),
                error: error.to_string(),
                attempts,
            })
        }
    }
}

async fn remove_partial(path: &Path, error: &DownloadError) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), error = %error, "removing partial segment");
        let _ = tokio::fs::remove_file(path).await;
    }
}
