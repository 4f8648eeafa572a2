//! Common utilities and types shared across FolderVault crates.
//!
//! This module provides the error taxonomy used by every layer plus the
//! small value types (passwords, run options) that cross crate boundaries.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{OperationOptions, Password};
