//! Shared state of one running operation.
//!
//! The orchestrator is the only writer of counters, status and progress. The
//! cancellation entry point may flip the cancel flag from any thread. Locks
//! guard plain data only and are never held across an `.await`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::events::FileProgress;

/// How long a settled file's progress stays readable.
pub const PROGRESS_RETENTION: Duration = Duration::from_millis(1500);

/// Weight of the newest sample in the smoothed rate.
pub const RATE_SMOOTHING: f64 = 0.3;

/// Lifecycle of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    /// Whether the run has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

struct TrackedFile {
    progress: FileProgress,
    settled_at: Option<Instant>,
}

/// Per-file byte progress with rate smoothing and delayed pruning.
#[derive(Default)]
pub struct ProgressTracker {
    files: HashMap<PathBuf, TrackedFile>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `(seen, total)` for `path` and return the updated snapshot.
    pub fn sample(&mut self, path: &Path, seen: u64, total: u64) -> FileProgress {
        self.sample_at(path, seen, total, Instant::now())
    }

    fn sample_at(&mut self, path: &Path, seen: u64, total: u64, now: Instant) -> FileProgress {
        self.prune_at(now);

        let entry = self
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| TrackedFile {
                progress: FileProgress {
                    path: path.to_path_buf(),
                    bytes_seen: 0,
                    bytes_total: total,
                    smoothed_rate_bytes_per_sec: 0.0,
                    last_sample: now,
                },
                settled_at: None,
            });

        // A file seen again after settling starts a fresh measurement.
        if entry.settled_at.take().is_some() {
            entry.progress.bytes_seen = 0;
            entry.progress.smoothed_rate_bytes_per_sec = 0.0;
            entry.progress.last_sample = now;
        }

        let progress = &mut entry.progress;
        let elapsed = now.saturating_duration_since(progress.last_sample).as_secs_f64();
        if elapsed > 0.0 && seen >= progress.bytes_seen {
            let instant_rate = (seen - progress.bytes_seen) as f64 / elapsed;
            progress.smoothed_rate_bytes_per_sec = if progress.smoothed_rate_bytes_per_sec == 0.0 {
                instant_rate
            } else {
                RATE_SMOOTHING * instant_rate + (1.0 - RATE_SMOOTHING) * progress.smoothed_rate_bytes_per_sec
            };
            progress.last_sample = now;
        }
        progress.bytes_seen = seen;
        progress.bytes_total = total;

        progress.clone()
    }

    /// Mark `path` as finished; it stays readable for [`PROGRESS_RETENTION`].
    pub fn settle(&mut self, path: &Path) {
        self.settle_at(path, Instant::now());
    }

    fn settle_at(&mut self, path: &Path, now: Instant) {
        if let Some(entry) = self.files.get_mut(path) {
            entry.settled_at.get_or_insert(now);
        }
    }

    /// Latest snapshot for `path`, if still retained.
    pub fn get(&mut self, path: &Path) -> Option<FileProgress> {
        self.get_at(path, Instant::now())
    }

    fn get_at(&mut self, path: &Path, now: Instant) -> Option<FileProgress> {
        self.prune_at(now);
        self.files.get(path).map(|entry| entry.progress.clone())
    }

    fn prune_at(&mut self, now: Instant) {
        self.files.retain(|_, entry| match entry.settled_at {
            Some(at) => now.saturating_duration_since(at) < PROGRESS_RETENTION,
            None => true,
        });
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// State of one operation run.
pub struct OperationState {
    cancel_requested: AtomicBool,
    token: CancellationToken,
    processed: AtomicUsize,
    total: AtomicUsize,
    status: Mutex<RunStatus>,
    tracker: Mutex<ProgressTracker>,
}

impl OperationState {
    /// Fresh idle state.
    pub fn new() -> Self {
        Self {
            cancel_requested: AtomicBool::new(false),
            token: CancellationToken::new(),
            processed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            status: Mutex::new(RunStatus::Idle),
            tracker: Mutex::new(ProgressTracker::new()),
        }
    }

    /// Ask the run to stop. Idempotent.
    pub fn request_cancellation(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Token for a single file, cancelled together with the run.
    pub fn file_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn status(&self) -> RunStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: RunStatus) {
        *self.status.lock() = status;
    }

    /// Move `Running` to `status`; any other current status is kept.
    pub(crate) fn finish_if_running(&self, status: RunStatus) -> bool {
        let mut current = self.status.lock();
        if *current == RunStatus::Running {
            *current = status;
            true
        } else {
            false
        }
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Count one more processed file and return the new count.
    pub fn mark_processed(&self) -> usize {
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn sample_progress(&self, path: &Path, seen: u64, total: u64) -> FileProgress {
        self.tracker.lock().sample(path, seen, total)
    }

    pub fn settle_progress(&self, path: &Path) {
        self.tracker.lock().settle(path);
    }

    /// Latest byte progress for `path`, if still retained.
    pub fn file_progress(&self, path: &Path) -> Option<FileProgress> {
        self.tracker.lock().get(path)
    }
}

impl Default for OperationState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationState")
            .field("status", &self.status())
            .field("processed", &self.processed())
            .field("total", &self.total())
            .field("cancel_requested", &self.is_cancel_requested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_has_no_rate() {
        let mut tracker = ProgressTracker::new();
        let snapshot = tracker.sample(Path::new("/a"), 100, 1000);
        assert_eq!(snapshot.bytes_seen, 100);
        assert_eq!(snapshot.bytes_total, 1000);
        assert_eq!(snapshot.smoothed_rate_bytes_per_sec, 0.0);
    }

    #[test]
    fn test_rate_is_exponentially_smoothed() {
        let mut tracker = ProgressTracker::new();
        let path = Path::new("/a");
        let t0 = Instant::now();

        tracker.sample_at(path, 0, 10_000, t0);
        // 1000 bytes in one second.
        let first = tracker.sample_at(path, 1000, 10_000, t0 + Duration::from_secs(1));
        assert!((first.smoothed_rate_bytes_per_sec - 1000.0).abs() < 1e-6);

        // 3000 bytes in the next second: 0.3 * 3000 + 0.7 * 1000.
        let second = tracker.sample_at(path, 4000, 10_000, t0 + Duration::from_secs(2));
        assert!((second.smoothed_rate_bytes_per_sec - 1600.0).abs() < 1e-6);
    }

    #[test]
    fn test_settled_entries_are_pruned_after_retention() {
        let mut tracker = ProgressTracker::new();
        let path = Path::new("/a");
        let t0 = Instant::now();

        tracker.sample_at(path, 5, 5, t0);
        tracker.settle_at(path, t0);

        let within = t0 + PROGRESS_RETENTION - Duration::from_millis(1);
        assert_eq!(tracker.get_at(path, within).map(|p| p.bytes_seen), Some(5));

        let after = t0 + PROGRESS_RETENTION;
        assert!(tracker.get_at(path, after).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_unsettled_entries_are_kept() {
        let mut tracker = ProgressTracker::new();
        let t0 = Instant::now();
        tracker.sample_at(Path::new("/busy"), 1, 10, t0);
        assert!(tracker
            .get_at(Path::new("/busy"), t0 + Duration::from_secs(60))
            .is_some());
    }

    #[test]
    fn test_cancellation_is_idempotent_and_reaches_children() {
        let state = OperationState::new();
        let child = state.file_token();
        assert!(!state.is_cancel_requested());

        state.request_cancellation();
        state.request_cancellation();

        assert!(state.is_cancel_requested());
        assert!(child.is_cancelled());
        assert!(state.file_token().is_cancelled());
    }

    #[test]
    fn test_counters_and_status() {
        let state = OperationState::new();
        assert_eq!(state.status(), RunStatus::Idle);
        state.set_status(RunStatus::Running);
        state.set_total(4);

        assert_eq!(state.mark_processed(), 1);
        assert_eq!(state.mark_processed(), 2);
        assert_eq!(state.processed(), 2);
        assert_eq!(state.total(), 4);

        assert!(state.finish_if_running(RunStatus::Completed));
        assert!(!state.finish_if_running(RunStatus::Failed));
        assert_eq!(state.status(), RunStatus::Completed);
        assert!(state.status().is_terminal());
    }
}
