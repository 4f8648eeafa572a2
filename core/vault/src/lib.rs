//! Folder encryption engine for FolderVault.
//!
//! This module provides:
//! - Streaming per-file encryption and decryption with atomic output commit
//! - Best-effort secure deletion of originals
//! - Deterministic directory traversal
//! - The folder-level orchestrator with progress events and cancellation
//!
//! # Architecture
//! [`FolderVault`] is the front-end facing controller. Each run is a
//! [`VaultOperation`] that walks the tree with [`TreeWalker`], hands every
//! file to the [`cipher`] functions and reports through an [`EventSink`].

pub mod cipher;
pub mod controller;
pub mod eraser;
pub mod events;
pub mod naming;
pub mod operation;
pub mod state;
pub mod walker;

pub use cipher::{decrypt_file, encrypt_file, CHUNK_SIZE};
pub use controller::FolderVault;
pub use eraser::{erase, DEFAULT_ERASE_PASSES};
pub use events::{EventSink, EventStreams, FileEvent, FileProgress, ProgressEvent};
pub use naming::{decrypted_path, encrypted_path, CONTAINER_SUFFIX, FALLBACK_SUFFIX};
pub use operation::{run_decrypt, run_encrypt, Mode, OperationOutcome, VaultOperation};
pub use state::{OperationState, RunStatus};
pub use walker::{FileWalk, TreeWalker};
