//! Folder-level orchestration.
//!
//! A [`VaultOperation`] counts the files under its root, then walks the tree a
//! second time and runs the per-file cipher on each one in turn, emitting
//! lifecycle and progress events as it goes. Cancellation is checked between
//! files through the run's [`OperationState`] and inside each file through a
//! child cancellation token.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::cipher::{decrypt_file, encrypt_file};
use crate::eraser::{erase, DEFAULT_ERASE_PASSES};
use crate::events::{EventSink, FileEvent, ProgressEvent};
use crate::naming::has_container_suffix;
use crate::state::{OperationState, RunStatus};
use crate::walker::{FileWalk, TreeWalker};
use foldervault_common::{Error, OperationOptions, Password, Result};

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

impl Mode {
    fn verb(self) -> &'static str {
        match self {
            Self::Encrypt => "Encrypting",
            Self::Decrypt => "Decrypting",
        }
    }

    /// Why `path` is not processed in this mode, if it is not.
    pub fn skip_reason(self, path: &Path) -> Option<&'static str> {
        match (self, has_container_suffix(path)) {
            (Self::Encrypt, true) => Some("already encrypted"),
            (Self::Decrypt, false) => Some("not an encrypted file"),
            _ => None,
        }
    }
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub success: bool,
    pub processed_count: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationOutcome {
    pub fn completed(processed_count: usize) -> Self {
        Self {
            success: true,
            processed_count,
            cancelled: false,
            error: None,
        }
    }

    pub fn cancelled(processed_count: usize) -> Self {
        Self {
            cancelled: true,
            ..Self::completed(processed_count)
        }
    }

    pub fn failed(processed_count: usize, error: impl Into<String>) -> Self {
        Self {
            success: false,
            processed_count,
            cancelled: false,
            error: Some(error.into()),
        }
    }
}

/// One encrypt or decrypt run over a folder tree.
pub struct VaultOperation {
    root: PathBuf,
    mode: Mode,
    options: OperationOptions,
    events: EventSink,
    state: Arc<OperationState>,
}

impl VaultOperation {
    /// Prepare a run over `root`. Nothing touches the filesystem until
    /// [`run`](Self::run).
    pub fn new(
        root: impl AsRef<Path>,
        mode: Mode,
        options: OperationOptions,
        events: EventSink,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            mode,
            options,
            events,
            state: Arc::new(OperationState::new()),
        }
    }

    /// Use an externally owned state, e.g. one a controller can cancel.
    pub fn with_state(mut self, state: Arc<OperationState>) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &Arc<OperationState> {
        &self.state
    }

    /// Process the whole tree.
    ///
    /// Per-file failures are reported as events and do not fail the run.
    /// Only problems with the run itself (unreadable root, failing walk,
    /// empty password) produce an unsuccessful outcome.
    pub async fn run(&self, password: &Password) -> OperationOutcome {
        self.state.set_status(RunStatus::Running);
        info!(root = %self.root.display(), mode = ?self.mode, "Operation started");

        match self.process(password).await {
            Ok(()) => {
                let processed = self.state.processed();
                self.state.finish_if_running(RunStatus::Completed);
                info!(processed, "Operation completed");
                self.events.log(format!(
                    "Done. {} of {} files processed.",
                    processed,
                    self.state.total()
                ));
                OperationOutcome::completed(processed)
            }
            Err(e) if e.is_cancelled() => self.settle_cancelled(),
            Err(e) => {
                let processed = self.state.processed();
                self.state.finish_if_running(RunStatus::Failed);
                warn!(error = %e, "Operation failed");
                self.events.log(format!("Operation failed: {}", e));
                OperationOutcome::failed(processed, e.to_string())
            }
        }
    }

    async fn process(&self, password: &Password) -> Result<()> {
        if password.is_empty() {
            return Err(Error::InvalidInput("Password must not be empty".to_string()));
        }

        let walker = TreeWalker::new(&self.root);
        let total = count_files(walker.clone()).await?;
        self.state.set_total(total);
        self.events.log(format!(
            "{} {} files in {}",
            self.mode.verb(),
            total,
            self.root.display()
        ));
        self.events.progress(ProgressEvent::Progress {
            processed: 0,
            total,
        });

        let mut files = blocking(move || walker.walk()).await?;
        loop {
            let (rest, entry) = next_file(files).await?;
            files = rest;
            let Some(entry) = entry else { break };

            if self.state.is_cancel_requested() {
                return Err(Error::Cancelled);
            }

            let path = entry?;
            self.process_file(&path, password, total).await?;

            let processed = self.state.mark_processed();
            self.events
                .progress(ProgressEvent::Progress { processed, total });
        }

        Ok(())
    }

    /// Handle one file. Only cancellation escapes as an error.
    async fn process_file(&self, path: &Path, password: &Password, total: usize) -> Result<()> {
        if let Some(reason) = self.mode.skip_reason(path) {
            debug!(path = %path.display(), reason, "Skipping file");
            self.events.progress(ProgressEvent::File(FileEvent::Skip {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            }));
            return Ok(());
        }

        self.events.progress(ProgressEvent::File(FileEvent::Start {
            path: path.to_path_buf(),
            index: self.state.processed() + 1,
            total,
        }));

        let token = self.state.file_token();
        let state = &self.state;
        let events = &self.events;
        let mut on_progress = |seen: u64, bytes_total: u64| {
            let snapshot = state.sample_progress(path, seen, bytes_total);
            events.progress(ProgressEvent::FileProgress(snapshot));
        };

        let result = match self.mode {
            Mode::Encrypt => encrypt_file(path, password, &token, &mut on_progress).await,
            Mode::Decrypt => decrypt_file(path, password, &token, &mut on_progress).await,
        };
        self.state.settle_progress(path);

        match result {
            Ok(output_path) => {
                self.events.progress(ProgressEvent::File(FileEvent::Done {
                    path: path.to_path_buf(),
                    output_path,
                }));
                self.dispose_original(path).await;
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                info!(path = %path.display(), "File interrupted by cancellation");
                Err(e)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "File failed");
                self.events.log(format!("Failed: {}: {}", path.display(), e));
                self.events.progress(ProgressEvent::File(FileEvent::Error {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }));
                Ok(())
            }
        }
    }

    /// Remove the source after a successful run over it, per options.
    async fn dispose_original(&self, path: &Path) {
        if self.options.keep_originals {
            return;
        }

        if self.options.secure_delete {
            if !erase(path, DEFAULT_ERASE_PASSES).await {
                self.events
                    .log(format!("Secure delete failed: {}", path.display()));
            }
        } else if let Err(e) = fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to delete original");
            self.events
                .log(format!("Delete failed: {}: {}", path.display(), e));
        }
    }

    fn settle_cancelled(&self) -> OperationOutcome {
        let processed = self.state.processed();
        self.state.finish_if_running(RunStatus::Cancelled);
        info!(processed, "Operation cancelled");
        self.events
            .log(format!("Cancelled after {} files.", processed));
        OperationOutcome::cancelled(processed)
    }
}

/// Fully materialize one walk on the blocking pool and count it.
async fn count_files(walker: TreeWalker) -> Result<usize> {
    blocking(move || walker.count()).await
}

/// Advance the processing walk on the blocking pool.
async fn next_file(mut files: FileWalk) -> Result<(FileWalk, Option<Result<PathBuf>>)> {
    blocking(move || {
        let entry = files.next();
        Ok((files, entry))
    })
    .await
}

/// Run directory I/O off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

/// Encrypt every file under `root`.
pub async fn run_encrypt(
    root: impl AsRef<Path>,
    password: &Password,
    options: OperationOptions,
    events: EventSink,
) -> OperationOutcome {
    VaultOperation::new(root, Mode::Encrypt, options, events)
        .run(password)
        .await
}

/// Decrypt every container under `root`.
pub async fn run_decrypt(
    root: impl AsRef<Path>,
    password: &Password,
    options: OperationOptions,
    events: EventSink,
) -> OperationOutcome {
    VaultOperation::new(root, Mode::Decrypt, options, events)
        .run(password)
        .await
}
