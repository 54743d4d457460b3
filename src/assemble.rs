//! Assembly of fetched segments into one tagged output file.
//!
//! The multiplexer writes to `<output>.part`; only a successful run is
//! renamed onto the final path. A failed run leaves nothing at either path.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::download::partial_path;

/// Name of the concat list written into the workspace.
pub const CONCAT_LIST_NAME: &str = "concat.txt";

const STDERR_TAIL_LINES: usize = 8;

/// Errors from assembling an episode.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    /// Nothing to assemble.
    #[error("no segments to assemble")]
    NoSegments,

    /// Filesystem failure around the multiplexer run.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The multiplexer binary could not be started.
    #[error(
        "could not run '{binary}': {source}\n  \
         Suggestion: install ffmpeg or pass --ffmpeg <PATH>"
    )]
    Unavailable {
        /// Binary that was invoked.
        binary: String,
        /// Spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The multiplexer exited unsuccessfully.
    #[error("multiplexer failed ({status}): {stderr}")]
    Failed {
        /// Exit status description.
        status: String,
        /// Tail of the multiplexer's stderr.
        stderr: String,
    },

    /// The multiplexer reported success but produced no file.
    #[error("multiplexer produced no output at {path}")]
    MissingOutput {
        /// Expected output path.
        path: PathBuf,
    },
}

impl AssembleError {
    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Metadata embedded in the output container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeMetadata {
    /// Container title.
    pub title: String,
    /// Episode number, written as the track tag.
    pub track: u32,
    /// Anime title, written as the album tag.
    pub album: String,
}

impl EpisodeMetadata {
    /// Metadata for one episode; the title falls back to `Episode <n>`.
    #[must_use]
    pub fn new(anime_title: &str, number: u32, episode_title: &str) -> Self {
        let title = if episode_title.trim().is_empty() {
            format!("Episode {number}")
        } else {
            episode_title.trim().to_string()
        };
        Self {
            title,
            track: number,
            album: anime_title.trim().to_string(),
        }
    }
}

/// External tool that concatenates segments without re-encoding.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Concatenates the files named in `list_file` into `output`.
    async fn concat(
        &self,
        list_file: &Path,
        output: &Path,
        metadata: &EpisodeMetadata,
    ) -> Result<(), AssembleError>;

    /// Verifies the tool can run at all.
    async fn check_available(&self) -> Result<(), AssembleError> {
        Ok(())
    }
}

/// [`Multiplexer`] backed by an `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegMultiplexer {
    binary: String,
}

impl Default for FfmpegMultiplexer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegMultiplexer {
    /// Uses `binary` (a name on `PATH` or a full path).
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments for a stream-copy concat run.
    #[must_use]
    pub fn concat_args(list_file: &Path, output: &Path, metadata: &EpisodeMetadata) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_file.display().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-metadata".to_string(),
            format!("title={}", metadata.title),
            "-metadata".to_string(),
            format!("track={}", metadata.track),
            "-metadata".to_string(),
            format!("album={}", metadata.album),
            "-f".to_string(),
            "mp4".to_string(),
            output.display().to_string(),
        ]
    }
}

#[async_trait]
impl Multiplexer for FfmpegMultiplexer {
    #[instrument(skip(self, metadata), fields(binary = %self.binary))]
    async fn concat(
        &self,
        list_file: &Path,
        output: &Path,
        metadata: &EpisodeMetadata,
    ) -> Result<(), AssembleError> {
        let args = Self::concat_args(list_file, output, metadata);
        debug!(?args, "running multiplexer");

        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| AssembleError::Unavailable {
                binary: self.binary.clone(),
                source,
            })?;

        if result.status.success() {
            return Ok(());
        }
        Err(AssembleError::Failed {
            status: result.status.to_string(),
            stderr: stderr_tail(&result.stderr),
        })
    }

    async fn check_available(&self) -> Result<(), AssembleError> {
        let result = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| AssembleError::Unavailable {
                binary: self.binary.clone(),
                source,
            })?;
        if result.status.success() {
            Ok(())
        } else {
            Err(AssembleError::Failed {
                status: result.status.to_string(),
                stderr: stderr_tail(&result.stderr),
            })
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// Concat list contents for segment files living next to the list.
#[must_use]
pub fn concat_list(segments: &[PathBuf]) -> String {
    let mut out = String::new();
    for segment in segments {
        let name = segment
            .file_name()
            .map_or_else(|| segment.display().to_string(), |n| n.to_string_lossy().into_owned());
        out.push_str("file '");
        out.push_str(&name.replace('\'', "'\\''"));
        out.push_str("'\n");
    }
    out
}

/// Drives a [`Multiplexer`] and owns the part-file/rename protocol.
#[derive(Clone)]
pub struct Assembler {
    multiplexer: Arc<dyn Multiplexer>,
}

impl std::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler").finish_non_exhaustive()
    }
}

impl Assembler {
    /// Creates an assembler around `multiplexer`.
    #[must_use]
    pub fn new(multiplexer: Arc<dyn Multiplexer>) -> Self {
        Self { multiplexer }
    }

    /// Concatenates `segments` (in the given order) into `output`.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError`] when there are no segments, the list cannot
    /// be written, the multiplexer fails, or the rename fails. The partial
    /// file is removed in every error case.
    #[instrument(
        skip(self, segments, metadata),
        fields(segments = segments.len(), output = %output.display())
    )]
    pub async fn assemble(
        &self,
        workspace: &Path,
        segments: &[PathBuf],
        metadata: &EpisodeMetadata,
        output: &Path,
    ) -> Result<(), AssembleError> {
        if segments.is_empty() {
            return Err(AssembleError::NoSegments);
        }

        let list_file = workspace.join(CONCAT_LIST_NAME);
        tokio::fs::write(&list_file, concat_list(segments))
            .await
            .map_err(|e| AssembleError::io(&list_file, e))?;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AssembleError::io(parent, e))?;
        }

        let part = partial_path(output);
        remove_if_present(&part).await;

        if let Err(error) = self.multiplexer.concat(&list_file, &part, metadata).await {
            warn!(error = %error, "multiplexer failed");
            remove_if_present(&part).await;
            return Err(error);
        }

        if !tokio::fs::try_exists(&part).await.unwrap_or(false) {
            return Err(AssembleError::MissingOutput { path: part });
        }

        promote(&part, output).await?;
        info!(output = %output.display(), "episode assembled");
        Ok(())
    }
}

/// Renames a finished `.part` file onto its final path, removing the part
/// file if the rename fails.
///
/// # Errors
///
/// Returns [`AssembleError::Io`] when the rename fails.
pub async fn promote(part: &Path, output: &Path) -> Result<(), AssembleError> {
    if let Err(e) = tokio::fs::rename(part, output).await {
        remove_if_present(part).await;
        return Err(AssembleError::io(output, e));
    }
    Ok(())
}

async fn remove_if_present(path: &Path) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "removing partial output");
        let _ = tokio::fs::remove_file(path).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use tempfile::TempDir;

    /// Copies every listed segment into the output, in list order.
    struct ConcatFake {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Multiplexer for ConcatFake {
        async fn concat(
            &self,
            list_file: &Path,
            output: &Path,
            metadata: &EpisodeMetadata,
        ) -> Result<(), AssembleError> {
            let list = std::fs::read_to_string(list_file).unwrap();
            self.calls.lock().unwrap().push(list.clone());
            let dir = list_file.parent().unwrap();
            let mut joined = Vec::new();
            for line in list.lines() {
                let name = line.trim_start_matches("file '").trim_end_matches('\'');
                joined.extend(std::fs::read(dir.join(name)).unwrap());
            }
            joined.extend(format!("|{}#{}", metadata.title, metadata.track).into_bytes());
            std::fs::write(output, joined).unwrap();
            Ok(())
        }
    }

    /// Writes some bytes, then fails.
    struct FailingFake;

    #[async_trait]
    impl Multiplexer for FailingFake {
        async fn concat(
            &self,
            _list_file: &Path,
            output: &Path,
            _metadata: &EpisodeMetadata,
        ) -> Result<(), AssembleError> {
            std::fs::write(output, b"half").unwrap();
            Err(AssembleError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "broken input".to_string(),
            })
        }
    }

    fn write_segments(dir: &Path, parts: &[&str]) -> Vec<PathBuf> {
        parts
            .iter()
            .enumerate()
            .map(|(i, body)| {
                let path = dir.join(format!("seg_{i:05}.ts"));
                std::fs::write(&path, body).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_concat_list_uses_manifest_order() {
        let list = concat_list(&[
            PathBuf::from("/ws/seg_00000.ts"),
            PathBuf::from("/ws/seg_00001.ts"),
        ]);
        assert_eq!(list, "file 'seg_00000.ts'\nfile 'seg_00001.ts'\n");
    }

    #[test]
    fn test_concat_args_include_metadata_and_copy() {
        let metadata = EpisodeMetadata::new("Show", 4, "");
        let args = FfmpegMultiplexer::concat_args(
            Path::new("/ws/concat.txt"),
            Path::new("/out/Episode_04.mp4.part"),
            &metadata,
        );
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(args.contains(&"title=Episode 4".to_string()));
        assert!(args.contains(&"track=4".to_string()));
        assert_eq!(args.last().unwrap(), "/out/Episode_04.mp4.part");
    }

    #[tokio::test]
    async fn test_assemble_renames_part_to_final() {
        let ws = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let segments = write_segments(ws.path(), &["a", "b", "c"]);
        let fake = Arc::new(ConcatFake {
            calls: Mutex::new(Vec::new()),
        });
        let assembler = Assembler::new(fake.clone());
        let output = out_dir.path().join("Show").join("Episode_01.mp4");

        assembler
            .assemble(
                ws.path(),
                &segments,
                &EpisodeMetadata::new("Show", 1, "Pilot"),
                &output,
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"abc|Pilot#1");
        assert!(!partial_path(&output).exists());
        assert_eq!(fake.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_assemble_failure_leaves_no_artifacts() {
        let ws = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let segments = write_segments(ws.path(), &["a"]);
        let assembler = Assembler::new(Arc::new(FailingFake));
        let output = out_dir.path().join("Episode_01.mp4");

        let err = assembler
            .assemble(
                ws.path(),
                &segments,
                &EpisodeMetadata::new("Show", 1, ""),
                &output,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AssembleError::Failed { .. }));
        assert!(!output.exists());
        assert!(!partial_path(&output).exists());
    }

    #[tokio::test]
    async fn test_assemble_rejects_empty_segment_list() {
        let ws = TempDir::new().unwrap();
        let assembler = Assembler::new(Arc::new(FailingFake));
        let err = assembler
            .assemble(
                ws.path(),
                &[],
                &EpisodeMetadata::new("Show", 1, ""),
                &ws.path().join("x.mp4"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AssembleError::NoSegments));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let mux = FfmpegMultiplexer::new("/nonexistent/anidl-test-ffmpeg");
        let err = mux.check_available().await.unwrap_err();
        assert!(matches!(err, AssembleError::Unavailable { .. }));
    }
}
