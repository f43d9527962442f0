//! Bookkeeping for files a job creates, so every exit path can clean up

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;

/// Outcome of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Remove `path` if present. Returns `true` when a file was deleted.
///
/// A missing file is not an error, so repeated calls are harmless.
pub async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("🧹 Removed {}", path.display());
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to delete file {}: {}", path.display(), e);
            false
        }
    }
}

/// Every output path a job may write, registered before the task that writes it starts
#[derive(Debug, Clone, Default)]
pub struct ArtifactTracker {
    paths: BTreeSet<PathBuf>,
}

impl ArtifactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete the given tracked paths. Untracked paths are left alone.
    pub async fn remove<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> CleanupReport {
        let mut report = CleanupReport::default();
        for path in paths {
            if !self.contains(path) {
                warn!("Refusing to delete untracked path {}", path.display());
                continue;
            }
            Self::remove_one(path, &mut report).await;
        }
        report
    }

    /// Delete every tracked path
    pub async fn remove_all(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for path in &self.paths {
            Self::remove_one(path, &mut report).await;
        }
        if !report.removed.is_empty() {
            info!("🧹 Cleaned up {} artifact(s)", report.removed.len());
        }
        report
    }

    /// Delete every tracked path without an async runtime, for use from `Drop`
    pub fn remove_all_blocking(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for path in &self.paths {
            Self::record(path, std::fs::remove_file(path), &mut report);
        }
        report
    }

    async fn remove_one(path: &Path, report: &mut CleanupReport) {
        Self::record(path, tokio::fs::remove_file(path).await, report);
    }

    fn record(path: &Path, result: std::io::Result<()>, report: &mut CleanupReport) {
        match result {
            Ok(()) => report.removed.push(path.to_path_buf()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to delete file {}: {}", path.display(), e);
                report.failed.push(path.to_path_buf());
            }
        }
    }
}

/// Owns a job's tracked artifacts while its tasks run.
///
/// Dropped while still armed (the job future was dropped before reaching a
/// terminal state), it cancels the job's tasks and deletes every tracked path.
#[derive(Debug)]
pub struct ArtifactGuard {
    tracker: ArtifactTracker,
    cancel: CancellationToken,
    armed: bool,
}

impl ArtifactGuard {
    pub fn new(tracker: ArtifactTracker, cancel: CancellationToken) -> Self {
        Self {
            tracker,
            cancel,
            armed: true,
        }
    }

    pub fn tracker(&self) -> &ArtifactTracker {
        &self.tracker
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// The job reached a terminal state and cleaned up after itself
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.cancel.cancel();
        let report = self.tracker.remove_all_blocking();
        warn!(
            "🧹 Job dropped mid-flight, removed {} artifact(s)",
            report.removed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_remove_all_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.jpg");
        let never_written = dir.path().join("c.mp4");
        tokio::fs::write(&a, b"a").await.unwrap();
        tokio::fs::write(&b, b"b").await.unwrap();

        let mut tracker = ArtifactTracker::new();
        tracker.register(&a);
        tracker.register(&b);
        tracker.register(&never_written);

        let first = tracker.remove_all().await;
        assert_eq!(first.removed.len(), 2);
        assert!(first.is_clean());
        assert!(!a.exists() && !b.exists());

        let second = tracker.remove_all().await;
        assert_eq!(second, CleanupReport::default());
    }

    #[tokio::test]
    async fn test_remove_ignores_untracked_paths() {
        let dir = TempDir::new().unwrap();
        let tracked = dir.path().join("tracked.mp4");
        let foreign = dir.path().join("upload.mp4");
        tokio::fs::write(&tracked, b"t").await.unwrap();
        tokio::fs::write(&foreign, b"f").await.unwrap();

        let mut tracker = ArtifactTracker::new();
        tracker.register(&tracked);

        let report = tracker
            .remove([tracked.as_path(), foreign.as_path()])
            .await;
        assert_eq!(report.removed, vec![tracked.clone()]);
        assert!(foreign.exists());
    }

    #[tokio::test]
    async fn test_remove_quietly_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.jpg");
        assert!(!remove_quietly(&path).await);
        tokio::fs::write(&path, b"x").await.unwrap();
        assert!(remove_quietly(&path).await);
        assert!(!remove_quietly(&path).await);
    }

    #[tokio::test]
    async fn test_armed_guard_cleans_up_on_drop() {
        let dir = TempDir::new().unwrap();
        let written = dir.path().join("720p.mp4");
        tokio::fs::write(&written, b"partial").await.unwrap();

        let mut tracker = ArtifactTracker::new();
        tracker.register(&written);
        let cancel = CancellationToken::new();

        drop(ArtifactGuard::new(tracker.clone(), cancel.clone()));
        assert!(cancel.is_cancelled());
        assert!(!written.exists());
    }

    #[tokio::test]
    async fn test_disarmed_guard_leaves_files() {
        let dir = TempDir::new().unwrap();
        let kept = dir.path().join("360p.mp4");
        tokio::fs::write(&kept, b"done").await.unwrap();

        let mut tracker = ArtifactTracker::new();
        tracker.register(&kept);
        let cancel = CancellationToken::new();

        let mut guard = ArtifactGuard::new(tracker, cancel.clone());
        guard.disarm();
        drop(guard);
        assert!(!cancel.is_cancelled());
        assert!(kept.exists());
    }
}
