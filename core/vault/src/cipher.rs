//! Per-file streaming encryption and decryption.
//!
//! Each call derives its own key from a fresh (encrypt) or embedded (decrypt)
//! salt, streams the file through AES-256-GCM in [`CHUNK_SIZE`] pieces and
//! reports `(seen, total)` after every chunk. The cancellation token is
//! checked at every chunk boundary.
//!
//! Decryption stages plaintext in a temporary sibling and only renames it onto
//! the final path after the tag verifies, so the final path never holds a
//! partial or unauthenticated file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::naming::{decrypted_path, encrypted_path};
use foldervault_common::{Error, Password, Result};
use foldervault_crypto::{
    derive_key, ContainerHeader, ContainerLayout, DecryptingStream, DerivedKey, EncryptingStream,
    Iv, Salt, HEADER_LEN, TAG_SIZE,
};

/// Streaming chunk size (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Per-chunk progress callback: `(bytes_seen, bytes_total)`.
pub type ByteProgress<'a> = dyn FnMut(u64, u64) + Send + 'a;

/// Encrypt `source` into a sibling container named `<source>.enc`.
///
/// # Postconditions
/// - The source file is never modified
/// - The container holds `header || ciphertext || tag`
///
/// # Errors
/// - `Cancelled` if `cancel` fires before the last chunk is written
/// - `Io` on read/write failures
/// - `KeyDerivationFailed` if the KDF cannot run
///
/// On failure the partial container is removed on a best-effort basis.
pub async fn encrypt_file(
    source: &Path,
    password: &Password,
    cancel: &CancellationToken,
    on_progress: &mut ByteProgress<'_>,
) -> Result<PathBuf> {
    let output = encrypted_path(source);
    debug!(path = %source.display(), "Encrypting file");

    let mut reader = File::open(source).await?;
    let total = reader.metadata().await?.len();

    ensure_not_cancelled(cancel)?;

    let header = ContainerHeader {
        salt: Salt::generate(),
        iv: Iv::generate(),
    };
    let key = derive(password, header.salt).await?;

    let mut staged = StagedOutput::create(output.clone()).await?;
    let writer = staged.file_mut()?;
    writer.write_all(&header.encode()).await?;

    let mut encryptor = EncryptingStream::new(&key, &header.iv);
    pump(&mut reader, &mut *writer, total, cancel, on_progress, |buf| {
        encryptor.update(buf)
    })
    .await?;
    writer.write_all(&encryptor.finalize()).await?;

    staged.persist().await?;

    debug!(path = %output.display(), size = total, "File encrypted");
    Ok(output)
}

/// Decrypt the container at `source` into its recovered sibling.
///
/// The output path is `source` with `.enc` stripped, or `<source>.dec` when
/// the suffix is absent.
///
/// # Errors
/// - `TruncatedFile` if the container cannot hold header and tag (no crypto runs)
/// - `InvalidMagic` if the header tag mismatches
/// - `AuthenticationFailed` for a wrong password or corrupted data
/// - `Cancelled` if `cancel` fires mid-stream
/// - `Io` on read/write/rename/fsync failures
///
/// On every failure the temporary output is removed and the final path is
/// left untouched.
pub async fn decrypt_file(
    source: &Path,
    password: &Password,
    cancel: &CancellationToken,
    on_progress: &mut ByteProgress<'_>,
) -> Result<PathBuf> {
    let output = decrypted_path(source);
    debug!(path = %source.display(), "Decrypting file");

    let mut reader = File::open(source).await?;
    let layout = ContainerLayout::for_len(reader.metadata().await?.len())?;

    let mut header_bytes = [0u8; HEADER_LEN];
    reader.read_exact(&mut header_bytes).await?;
    let header = ContainerHeader::parse(&header_bytes)?;

    let mut tag = [0u8; TAG_SIZE];
    reader.seek(SeekFrom::Start(layout.tag_offset())).await?;
    reader.read_exact(&mut tag).await?;
    reader
        .seek(SeekFrom::Start(layout.ciphertext_offset()))
        .await?;

    ensure_not_cancelled(cancel)?;

    let key = derive(password, header.salt).await?;

    let mut staged = StagedOutput::create(temp_path_for(&output)).await?;
    let writer = staged.file_mut()?;

    let mut decryptor = DecryptingStream::new(&key, &header.iv);
    let mut ciphertext = (&mut reader).take(layout.ciphertext_len());
    pump(
        &mut ciphertext,
        &mut *writer,
        layout.ciphertext_len(),
        cancel,
        on_progress,
        |buf| decryptor.update(buf),
    )
    .await?;
    decryptor.verify(&tag)?;

    staged.commit(&output).await?;

    debug!(path = %output.display(), "File decrypted");
    Ok(output)
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Run scrypt on the blocking pool.
///
/// The key is zeroized on drop, including when the awaiting future is dropped
/// and the blocking task's result is discarded.
async fn derive(password: &Password, salt: Salt) -> Result<DerivedKey> {
    let password = password.clone();
    tokio::task::spawn_blocking(move || derive_key(password.as_bytes(), &salt))
        .await
        .map_err(|e| Error::KeyDerivationFailed(format!("KDF task failed: {}", e)))?
}

/// Copy `reader` to `writer` through `transform`, chunk by chunk.
async fn pump<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    total: u64,
    cancel: &CancellationToken,
    on_progress: &mut ByteProgress<'_>,
    mut transform: F,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(&mut [u8]) -> Result<()>,
{
    let mut buf = Zeroizing::new(vec![0u8; CHUNK_SIZE]);
    let mut seen = 0u64;

    loop {
        ensure_not_cancelled(cancel)?;

        let n = reader.read(&mut buf[..]).await?;
        if n == 0 {
            break;
        }

        transform(&mut buf[..n])?;
        writer.write_all(&buf[..n]).await?;

        seen += n as u64;
        on_progress(seen, total);
    }

    Ok(seen)
}

/// Temporary sibling for `output`: `.fv-<uuid>.tmp` in the same directory.
///
/// The name does not embed the output name, so it stays short for any output
/// the filesystem accepts.
fn temp_path_for(output: &Path) -> PathBuf {
    output.with_file_name(format!(".fv-{}.tmp", Uuid::new_v4().simple()))
}

/// An output file that is removed unless it is explicitly kept.
///
/// Dropping it on any error path (including a dropped future) deletes the
/// file, so callers can use `?` freely.
struct StagedOutput {
    path: PathBuf,
    file: Option<File>,
    armed: bool,
}

impl StagedOutput {
    async fn create(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Some(file),
            armed: true,
        })
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::InvalidInput("Staged output already closed".to_string()))
    }

    /// Flush to durable storage and keep the file where it is.
    async fn persist(&mut self) -> Result<()> {
        self.sync_and_close().await?;
        self.armed = false;
        Ok(())
    }

    /// Flush to durable storage and atomically rename onto `dest`.
    async fn commit(&mut self, dest: &Path) -> Result<()> {
        self.sync_and_close().await?;
        fs::rename(&self.path, dest).await?;
        self.armed = false;
        Ok(())
    }

    async fn sync_and_close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Best-effort removal. Returns whether the file is gone.
    fn discard(&mut self) -> bool {
        self.armed = false;
        // Close the handle before unlinking.
        self.file = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove partial output");
                false
            }
        }
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if self.armed {
            debug!(path = %self.path.display(), "Discarding partial output");
            self.discard();
        }
    }
}
