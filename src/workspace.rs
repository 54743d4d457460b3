//! Run state: temporary episode workspaces and the outcome tally.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tracing::{debug, warn};

const WORKSPACE_PREFIX: &str = "anidl-";

/// Tracks every workspace this run created so an interrupt can remove them.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceRegistry {
    root: Option<PathBuf>,
    live: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl WorkspaceRegistry {
    /// Registry creating workspaces under the system temp directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry creating workspaces under `root`.
    #[must_use]
    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            live: Arc::default(),
        }
    }

    /// Creates and registers a fresh workspace.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the directory cannot be created.
    pub fn create(&self, label: &str) -> io::Result<Workspace> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("{WORKSPACE_PREFIX}{label}-");
        builder.prefix(&prefix);
        let dir = match &self.root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        if let Ok(mut live) = self.live.lock() {
            live.insert(path.clone());
        }
        debug!(path = %path.display(), "workspace created");
        Ok(Workspace {
            dir: Some(dir),
            path,
            registry: self.clone(),
        })
    }

    /// Paths of workspaces not yet released.
    #[must_use]
    pub fn live(&self) -> Vec<PathBuf> {
        self.live
            .lock()
            .map(|live| live.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes every live workspace. Used on interrupt.
    pub fn cleanup_all(&self) -> usize {
        let paths: Vec<PathBuf> = match self.live.lock() {
            Ok(mut live) => std::mem::take(&mut *live).into_iter().collect(),
            Err(_) => return 0,
        };
        let mut removed = 0;
        for path in paths {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove workspace"),
            }
        }
        removed
    }

    fn release(&self, path: &Path) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(path);
        }
    }
}

/// One episode's scratch directory. Removed and unregistered on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    registry: WorkspaceRegistry,
}

impl Workspace {
    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take()
            && let Err(e) = dir.close()
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "could not remove workspace");
        }
        self.registry.release(&self.path);
    }
}

/// Terminal state of one episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionResult {
    /// Output already existed; nothing was fetched.
    SkippedExists,
    /// Output written.
    Succeeded,
    /// Episode failed with this reason.
    Failed(String),
}

impl AcquisitionResult {
    /// Skips and successes both count as success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Per-run outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTally {
    /// Episodes written this run.
    pub succeeded: usize,
    /// Episodes skipped because the output existed.
    pub skipped: usize,
    /// Failed episodes with their reasons.
    pub failed: Vec<(u32, String)>,
}

impl RunTally {
    /// Records one episode's result.
    pub fn record(&mut self, episode: u32, result: &AcquisitionResult) {
        match result {
            AcquisitionResult::SkippedExists => self.skipped += 1,
            AcquisitionResult::Succeeded => self.succeeded += 1,
            AcquisitionResult::Failed(reason) => self.failed.push((episode, reason.clone())),
        }
    }

    /// Episodes processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed.len()
    }

    /// True when no episode failed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Explicit state for one run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Workspaces created by this run.
    pub workspaces: WorkspaceRegistry,
    /// Outcome counts.
    pub tally: RunTally,
}

impl RunContext {
    /// Context using `workspaces` for scratch directories.
    #[must_use]
    pub fn new(workspaces: WorkspaceRegistry) -> Self {
        Self {
            workspaces,
            tally: RunTally::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_drop() {
        let root = tempfile::TempDir::new().unwrap();
        let registry = WorkspaceRegistry::in_dir(root.path());
        let ws = registry.create("ep1").unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(registry.live(), vec![path.clone()]);

        drop(ws);
        assert!(!path.exists());
        assert!(registry.live().is_empty());
    }

    #[test]
    fn test_cleanup_all_removes_only_registered_dirs() {
        let root = tempfile::TempDir::new().unwrap();
        let unrelated = root.path().join("anidl-other");
        std::fs::create_dir(&unrelated).unwrap();

        let registry = WorkspaceRegistry::in_dir(root.path());
        let a = registry.create("ep1").unwrap();
        let b = registry.create("ep2").unwrap();
        std::fs::write(a.path().join("seg_00000.ts"), b"x").unwrap();

        assert_eq!(registry.cleanup_all(), 2);
        assert!(!a.path().exists());
        assert!(!b.path().exists());
        assert!(unrelated.exists());

        // Dropping after cleanup must not panic.
        drop(a);
        drop(b);
    }

    #[test]
    fn test_tally_counts_skips_as_success() {
        let mut tally = RunTally::default();
        tally.record(1, &AcquisitionResult::SkippedExists);
        tally.record(2, &AcquisitionResult::Succeeded);
        assert!(tally.all_succeeded());
        tally.record(3, &AcquisitionResult::Failed("no servers".to_string()));
        assert!(!tally.all_succeeded());
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.failed, vec![(3, "no servers".to_string())]);
    }
}
