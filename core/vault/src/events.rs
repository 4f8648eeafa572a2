//! Progress and log events emitted by a running operation.
//!
//! Two independent streams leave an operation: free-form log lines and
//! structured [`ProgressEvent`]s. Sending never blocks and never fails the
//! run; events are dropped once the receiving side goes away.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;

/// A structured progress event.
///
/// Serialized as `{"type": "file" | "file-progress" | "progress", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressEvent {
    /// Per-file lifecycle.
    File(FileEvent),
    /// Byte-level progress inside the current file.
    FileProgress(FileProgress),
    /// Files processed so far out of the counted total.
    Progress { processed: usize, total: usize },
}

/// Per-file lifecycle events, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileEvent {
    /// Processing begins; `index` is 1-based.
    Start {
        path: PathBuf,
        index: usize,
        total: usize,
    },
    /// The file does not match the operation's mode.
    Skip { path: PathBuf, reason: String },
    /// The output was written.
    Done {
        path: PathBuf,
        #[serde(rename = "outputPath")]
        output_path: PathBuf,
    },
    /// The file failed; the run continues.
    Error { path: PathBuf, message: String },
}

/// Byte progress snapshot for one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    pub path: PathBuf,
    pub bytes_seen: u64,
    pub bytes_total: u64,
    /// Exponentially smoothed throughput.
    pub smoothed_rate_bytes_per_sec: f64,
    #[serde(skip)]
    pub last_sample: Instant,
}

impl FileProgress {
    /// Completion ratio in `[0, 1]`. Empty files count as complete.
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            1.0
        } else {
            (self.bytes_seen as f64 / self.bytes_total as f64).min(1.0)
        }
    }
}

/// Sending half of both event streams.
#[derive(Debug, Clone)]
pub struct EventSink {
    log: Option<mpsc::UnboundedSender<String>>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

/// Receiving half of both event streams.
#[derive(Debug)]
pub struct EventStreams {
    pub log: mpsc::UnboundedReceiver<String>,
    pub progress: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl EventSink {
    /// Create a connected sink and its streams.
    pub fn channel() -> (Self, EventStreams) {
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();

        let sink = Self {
            log: Some(log_tx),
            progress: Some(progress_tx),
        };
        let streams = EventStreams {
            log: log_rx,
            progress: progress_rx,
        };
        (sink, streams)
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self {
            log: None,
            progress: None,
        }
    }

    /// Emit a log line.
    pub fn log(&self, message: impl Into<String>) {
        if let Some(tx) = &self.log {
            let _ = tx.send(message.into());
        }
    }

    /// Emit a progress event.
    pub fn progress(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::discard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_event_json_shape() {
        let start = ProgressEvent::File(FileEvent::Start {
            path: PathBuf::from("/d/a.txt"),
            index: 1,
            total: 2,
        });
        assert_eq!(
            serde_json::to_value(&start).unwrap(),
            json!({"type": "file", "status": "start", "path": "/d/a.txt", "index": 1, "total": 2})
        );

        let done = ProgressEvent::File(FileEvent::Done {
            path: PathBuf::from("/d/a.txt"),
            output_path: PathBuf::from("/d/a.txt.enc"),
        });
        assert_eq!(
            serde_json::to_value(&done).unwrap(),
            json!({"type": "file", "status": "done", "path": "/d/a.txt", "outputPath": "/d/a.txt.enc"})
        );
    }

    #[test]
    fn test_progress_json_shapes() {
        let overall = ProgressEvent::Progress {
            processed: 3,
            total: 5,
        };
        assert_eq!(
            serde_json::to_value(&overall).unwrap(),
            json!({"type": "progress", "processed": 3, "total": 5})
        );

        let bytes = ProgressEvent::FileProgress(FileProgress {
            path: PathBuf::from("/d/b"),
            bytes_seen: 10,
            bytes_total: 20,
            smoothed_rate_bytes_per_sec: 0.0,
            last_sample: Instant::now(),
        });
        assert_eq!(
            serde_json::to_value(&bytes).unwrap(),
            json!({
                "type": "file-progress",
                "path": "/d/b",
                "bytesSeen": 10,
                "bytesTotal": 20,
                "smoothedRateBytesPerSec": 0.0
            })
        );
    }

    #[tokio::test]
    async fn test_sink_delivers_in_order() {
        let (sink, mut streams) = EventSink::channel();
        sink.log("first");
        sink.log("second");
        sink.progress(ProgressEvent::Progress {
            processed: 0,
            total: 0,
        });

        assert_eq!(streams.log.recv().await.as_deref(), Some("first"));
        assert_eq!(streams.log.recv().await.as_deref(), Some("second"));
        assert!(matches!(
            streams.progress.recv().await,
            Some(ProgressEvent::Progress { .. })
        ));
    }

    #[test]
    fn test_sink_survives_closed_receivers() {
        let (sink, streams) = EventSink::channel();
        drop(streams);
        sink.log("nobody listens");
        EventSink::discard().log("dropped");
    }

    #[test]
    fn test_fraction_of_empty_file() {
        let progress = FileProgress {
            path: PathBuf::from("e"),
            bytes_seen: 0,
            bytes_total: 0,
            smoothed_rate_bytes_per_sec: 0.0,
            last_sample: Instant::now(),
        };
        assert_eq!(progress.fraction(), 1.0);
    }
}
