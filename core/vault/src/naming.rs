//! Sibling naming for containers and recovered files.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Extension carried by every container (without the dot).
pub const CONTAINER_EXTENSION: &str = "enc";

/// Suffix appended to a source path to name its container.
pub const CONTAINER_SUFFIX: &str = ".enc";

/// Suffix appended on decrypt when the source lacks [`CONTAINER_SUFFIX`].
pub const FALLBACK_SUFFIX: &str = ".dec";

/// Whether `path` already bears the container suffix.
///
/// A bare dotfile named `.enc` has no extension and does not count.
pub fn has_container_suffix(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == CONTAINER_EXTENSION)
        .unwrap_or(false)
}

/// `a/b.txt` -> `a/b.txt.enc`
pub fn encrypted_path(source: &Path) -> PathBuf {
    append_suffix(source, CONTAINER_SUFFIX)
}

/// `a/b.txt.enc` -> `a/b.txt`, anything else -> `<source>.dec`
pub fn decrypted_path(source: &Path) -> PathBuf {
    match source.file_stem() {
        Some(stem) if has_container_suffix(source) => source.with_file_name(stem),
        _ => append_suffix(source, FALLBACK_SUFFIX),
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
