//! Best-effort secure deletion.

use std::io::SeekFrom;
use std::path::Path;

use rand::RngCore;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Overwrite passes used when originals are securely deleted.
pub const DEFAULT_ERASE_PASSES: u32 = 3;

/// Size of the reusable random buffer (64 KiB).
const ERASE_CHUNK_SIZE: usize = 64 * 1024;

/// Overwrite `path` with random data `passes` times, then unlink it.
///
/// Each pass covers the file's full length and is flushed to durable storage
/// before the next one starts. Memory use is bounded by one chunk buffer.
///
/// Never fails loudly: any I/O error is logged and reported as `false`, in
/// which case the original file may still exist.
pub async fn erase(path: &Path, passes: u32) -> bool {
    match overwrite_and_unlink(path, passes).await {
        Ok(()) => {
            debug!(path = %path.display(), passes, "File securely erased");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Secure erase failed");
            false
        }
    }
}

async fn overwrite_and_unlink(path: &Path, passes: u32) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path).await?;
    let len = file.metadata().await?.len();
    let mut buf = vec![0u8; ERASE_CHUNK_SIZE];

    for _ in 0..passes {
        file.seek(SeekFrom::Start(0)).await?;

        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(ERASE_CHUNK_SIZE as u64) as usize;
            rand::thread_rng().fill_bytes(&mut buf[..n]);
            file.write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
    }

    drop(file);
    fs::remove_file(path).await
}
