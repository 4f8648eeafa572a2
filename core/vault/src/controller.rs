//! Operation API for front ends.
//!
//! [`FolderVault`] owns the event streams and the state of the current run.
//! It allows one operation at a time and routes cancellation requests to
//! whichever run is active.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::events::{EventSink, EventStreams, FileProgress};
use crate::operation::{Mode, OperationOutcome, VaultOperation};
use crate::state::{OperationState, RunStatus};
use foldervault_common::{Error, OperationOptions, Password, Result};

/// Entry point for encrypting and decrypting folders.
pub struct FolderVault {
    events: EventSink,
    /// State of the current or most recent run.
    current: Mutex<Option<Arc<OperationState>>>,
}

impl FolderVault {
    /// Create a controller together with the streams it emits to.
    pub fn new() -> (Self, EventStreams) {
        let (sink, streams) = EventSink::channel();
        (Self::with_events(sink), streams)
    }

    /// Create a controller emitting into an existing sink.
    pub fn with_events(events: EventSink) -> Self {
        Self {
            events,
            current: Mutex::new(None),
        }
    }

    /// Resolve and validate a folder selection.
    ///
    /// # Errors
    /// - `NotFound` if the path does not exist
    /// - `InvalidInput` if it is not a directory
    pub fn choose_folder(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let resolved = std::fs::canonicalize(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("Folder not found: {}", path.display()))
            }
            _ => Error::Io(e),
        })?;

        if !resolved.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Not a directory: {}",
                resolved.display()
            )));
        }

        debug!(path = %resolved.display(), "Folder chosen");
        Ok(resolved)
    }

    /// Encrypt every file under `path`.
    pub async fn encrypt_folder(
        &self,
        path: impl AsRef<Path>,
        password: &Password,
        options: OperationOptions,
    ) -> OperationOutcome {
        self.run(path.as_ref(), Mode::Encrypt, password, options)
            .await
    }

    /// Decrypt every container under `path`.
    pub async fn decrypt_folder(
        &self,
        path: impl AsRef<Path>,
        password: &Password,
        options: OperationOptions,
    ) -> OperationOutcome {
        self.run(path.as_ref(), Mode::Decrypt, password, options)
            .await
    }

    async fn run(
        &self,
        path: &Path,
        mode: Mode,
        password: &Password,
        options: OperationOptions,
    ) -> OperationOutcome {
        let state = match self.begin() {
            Ok(state) => state,
            Err(e) => {
                self.events.log(format!("Cannot start: {}", e));
                return OperationOutcome::failed(0, e.to_string());
            }
        };
        let _active = ActiveRun {
            state: Arc::clone(&state),
        };

        VaultOperation::new(path, mode, options, self.events.clone())
            .with_state(state)
            .run(password)
            .await
    }

    /// Claim the controller for a new run.
    fn begin(&self) -> Result<Arc<OperationState>> {
        let mut current = self.current.lock();
        if let Some(state) = current.as_ref() {
            if state.status() == RunStatus::Running {
                return Err(Error::Busy);
            }
        }

        let state = Arc::new(OperationState::new());
        state.set_status(RunStatus::Running);
        *current = Some(Arc::clone(&state));
        Ok(state)
    }

    /// Request cancellation of the active run.
    ///
    /// Returns whether a run was signalled. Safe to call at any time.
    pub fn cancel_operation(&self) -> bool {
        let current = self.current.lock();
        match current.as_ref() {
            Some(state) if state.status() == RunStatus::Running => {
                info!("Cancellation requested");
                state.request_cancellation();
                true
            }
            _ => false,
        }
    }

    /// Whether a run is in progress.
    pub fn is_busy(&self) -> bool {
        self.status() == RunStatus::Running
    }

    /// Status of the current or most recent run.
    pub fn status(&self) -> RunStatus {
        self.current
            .lock()
            .as_ref()
            .map(|state| state.status())
            .unwrap_or(RunStatus::Idle)
    }

    /// Latest byte progress for `path` in the current or most recent run.
    pub fn file_progress(&self, path: impl AsRef<Path>) -> Option<FileProgress> {
        let state = self.current.lock().as_ref().map(Arc::clone)?;
        state.file_progress(path.as_ref())
    }
}

/// Settles a run whose future was dropped before it finished.
struct ActiveRun {
    state: Arc<OperationState>,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if self.state.status() == RunStatus::Running {
            self.state.request_cancellation();
            self.state.finish_if_running(RunStatus::Cancelled);
        }
    }
}
