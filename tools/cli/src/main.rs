//! FolderVault CLI - Command line interface for folder encryption.
//!
//! Encrypts or decrypts every file under a folder, printing progress as it
//! goes, and can inspect a single container without a password.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroize;

use foldervault_common::{OperationOptions, Password};
use foldervault_crypto::{ContainerHeader, ContainerLayout, HEADER_LEN, MAGIC};
use foldervault_vault::{EventStreams, FileEvent, FolderVault, OperationOutcome, ProgressEvent};

#[derive(Parser)]
#[command(name = "foldervault")]
#[command(about = "FolderVault - Password-based folder encryption")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt every file in a folder.
    Encrypt {
        /// Folder to encrypt.
        dir: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Decrypt every `.enc` file in a folder.
    Decrypt {
        /// Folder to decrypt.
        dir: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show the header of a container.
    Inspect {
        /// Container file.
        file: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Keep the source files (default).
    #[arg(long, conflicts_with = "delete_originals")]
    keep_originals: bool,

    /// Delete each source file after it was processed successfully.
    #[arg(long)]
    delete_originals: bool,

    /// Overwrite sources with random data before deleting them.
    #[arg(long, requires = "delete_originals")]
    secure_delete: bool,

    /// Print progress events as JSON lines.
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn options(&self) -> OperationOptions {
        OperationOptions {
            keep_originals: self.keep_originals || !self.delete_originals,
            secure_delete: self.secure_delete,
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Encrypt { dir, run } => cmd_run(Direction::Encrypt, &dir, &run).await,
        Commands::Decrypt { dir, run } => cmd_run(Direction::Decrypt, &dir, &run).await,
        Commands::Inspect { file } => cmd_inspect(&file).await,
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Password> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Password::from(password))
}

/// Prompt twice and require both entries to match.
fn prompt_new_password() -> Result<Password> {
    let password = prompt_password("Enter password: ")?;
    let mut confirm = rpassword::prompt_password("Confirm password: ")
        .context("Failed to read password")?;

    let matches = password.as_bytes() == confirm.as_bytes();
    confirm.zeroize();

    if !matches {
        anyhow::bail!("Passwords do not match");
    }
    Ok(password)
}

/// Encrypt or decrypt a folder.
async fn cmd_run(direction: Direction, dir: &Path, args: &RunArgs) -> Result<()> {
    let (vault, streams) = FolderVault::new();
    let root = vault.choose_folder(dir).context("Invalid folder")?;

    let password = match direction {
        Direction::Encrypt => prompt_new_password()?,
        Direction::Decrypt => prompt_password("Enter password: ")?,
    };
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let printers = spawn_printers(streams, args.json);
    let options = args.options();

    let outcome = {
        let run = async {
            match direction {
                Direction::Encrypt => vault.encrypt_folder(&root, &password, options).await,
                Direction::Decrypt => vault.decrypt_folder(&root, &password, options).await,
            }
        };
        tokio::pin!(run);

        loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    warn!("Interrupted, finishing current chunk");
                    vault.cancel_operation();
                }
            }
        }
    };

    // Dropping the controller closes the event streams.
    drop(vault);
    join_printers(printers).await;

    report(&outcome, args.json)
}

/// Wait for the printers; a failed printer is logged, not fatal.
async fn join_printers(printers: [JoinHandle<()>; 2]) -> usize {
    let mut failed = 0;
    for printer in printers {
        if let Err(e) = printer.await {
            warn!("Event printer failed: {}", e);
            failed += 1;
        }
    }
    failed
}

/// Drain both event streams in the background.
fn spawn_printers(streams: EventStreams, json: bool) -> [JoinHandle<()>; 2] {
    let EventStreams {
        mut log,
        mut progress,
    } = streams;

    let logs = tokio::spawn(async move {
        while let Some(line) = log.recv().await {
            info!("{}", line);
        }
    });

    let events = tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to serialize event: {}", e),
                }
            } else {
                print_event(&event);
            }
        }
    });

    [logs, events]
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::File(FileEvent::Start { path, index, total }) => {
            println!("[{}/{}] {}", index, total, path.display());
        }
        ProgressEvent::File(FileEvent::Skip { path, reason }) => {
            println!("  skipped {} ({})", path.display(), reason);
        }
        ProgressEvent::File(FileEvent::Done { output_path, .. }) => {
            println!("  -> {}", output_path.display());
        }
        ProgressEvent::File(FileEvent::Error { path, message }) => {
            eprintln!("  error {}: {}", path.display(), message);
        }
        ProgressEvent::FileProgress(_) | ProgressEvent::Progress { .. } => {}
    }
}

fn report(outcome: &OperationOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
    } else if outcome.cancelled {
        println!("Cancelled after {} files.", outcome.processed_count);
    } else if outcome.success {
        println!("Finished: {} files processed.", outcome.processed_count);
    }

    match &outcome.error {
        Some(error) if !outcome.success => anyhow::bail!("Operation failed: {}", error),
        _ => Ok(()),
    }
}

/// Print container header fields.
async fn cmd_inspect(path: &Path) -> Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let len = file.metadata().await?.len();
    let layout = ContainerLayout::for_len(len).context("Not a valid container")?;

    let mut header_bytes = [0u8; HEADER_LEN];
    file.read_exact(&mut header_bytes)
        .await
        .context("Failed to read header")?;
    let header = ContainerHeader::parse(&header_bytes).context("Not a valid container")?;

    println!("Container: {}", path.display());
    println!("  Magic: {}", String::from_utf8_lossy(&MAGIC));
    println!("  Salt: {}", STANDARD.encode(header.salt.as_bytes()));
    println!("  IV: {}", STANDARD.encode(header.iv.as_bytes()));
    println!("  Ciphertext: {} bytes", layout.ciphertext_len());
    println!("  Total: {} bytes", len);

    Ok(())
}
