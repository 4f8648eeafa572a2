//! Common error types for FolderVault.

use thiserror::Error;

/// Top-level error type for FolderVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The container does not start with the FolderVault magic tag.
    #[error("Not a FolderVault container (bad magic)")]
    InvalidMagic,

    /// The container is shorter than header plus authentication tag.
    #[error("Container truncated: {len} bytes is below the {min} byte minimum")]
    TruncatedFile { len: u64, min: u64 },

    /// Wrong password, corrupted or tampered data.
    ///
    /// These causes are intentionally not distinguished.
    #[error("Decryption failed: wrong password or corrupted data")]
    AuthenticationFailed,

    /// The key derivation primitive rejected its input.
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another folder operation is already running.
    #[error("An operation is already in progress")]
    Busy,
}

impl Error {
    /// Whether this error represents a cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::AuthenticationFailed.is_cancelled());
    }

    #[test]
    fn test_authentication_message_does_not_hint_cause() {
        let msg = Error::AuthenticationFailed.to_string();
        assert!(!msg.to_lowercase().contains("tag mismatch"));
        assert!(msg.contains("wrong password or corrupted data"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
