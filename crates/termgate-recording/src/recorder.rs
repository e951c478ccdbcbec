//! Append-only replay file writer.
//!
//! One recorder owns the write handle for one replay file. Input and output
//! directions may append concurrently, so every operation serializes on an
//! internal lock. Frames carry elapsed seconds relative to open time and
//! never go backwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use termgate_core::replay::{self, FrameChannel, ReplayHeader, REPLAY_VERSION};
use termgate_core::{RecordingError, RecordingResult};

/// Terminal geometry at recording start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub cols: u16,
    pub rows: u16,
}

struct RecorderInner {
    /// Taken at stop; a missing writer marks the recorder closed.
    writer: Option<BufWriter<File>>,
    /// Header + frame bytes appended so far.
    bytes_written: u64,
    /// Highest elapsed value written; replay order depends on frames never
    /// going backwards.
    last_elapsed: f64,
    /// Set at stop; freezes `duration`.
    stopped_after: Option<Duration>,
}

/// Writer for one session's replay file.
pub struct Recorder {
    path: PathBuf,
    opened: Instant,
    inner: Mutex<RecorderInner>,
}

impl Recorder {
    /// Create the replay file (and any missing parent directories) and write
    /// the header line.
    pub async fn open(
        path: impl Into<PathBuf>,
        geometry: Geometry,
        title: Option<String>,
    ) -> RecordingResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;
        let mut writer = BufWriter::new(file);

        let header = ReplayHeader {
            version: REPLAY_VERSION,
            width: geometry.cols,
            height: geometry.rows,
            timestamp: chrono::Utc::now().timestamp(),
            title,
        };
        let mut line = serde_json::to_string(&header)
            .map_err(|e| RecordingError::Format(e.to_string()))?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;

        debug!(path = %path.display(), cols = geometry.cols, rows = geometry.rows, "replay file opened");
        Ok(Self {
            path,
            opened: Instant::now(),
            inner: Mutex::new(RecorderInner {
                writer: Some(writer),
                bytes_written: line.len() as u64,
                last_elapsed: 0.0,
                stopped_after: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one frame. A zero-length payload is a no-op; writing through a
    /// stopped recorder is an I/O failure.
    pub async fn write_frame(&self, channel: FrameChannel, payload: &str) -> RecordingResult<()> {
        if payload.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock().await;
        let elapsed = self.opened.elapsed().as_secs_f64().max(inner.last_elapsed);
        let writer = inner.writer.as_mut().ok_or_else(|| {
            RecordingError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "recorder is closed",
            ))
        })?;

        let mut line = replay::encode_frame(elapsed, channel, payload)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;

        inner.last_elapsed = elapsed;
        inner.bytes_written += line.len() as u64;
        Ok(())
    }

    /// Flush, fsync, and close the replay file. Idempotent: a second stop is
    /// a logged no-op.
    pub async fn stop(&self) -> RecordingResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(mut writer) = inner.writer.take() else {
            debug!(path = %self.path.display(), "recorder already stopped");
            return Ok(());
        };
        inner.stopped_after = Some(self.opened.elapsed());
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        debug!(path = %self.path.display(), bytes = inner.bytes_written, "recording stopped");
        Ok(())
    }

    /// Elapsed recording time. Keeps counting while live, frozen once stopped.
    pub async fn duration(&self) -> Duration {
        let inner = self.inner.lock().await;
        inner.stopped_after.unwrap_or_else(|| self.opened.elapsed())
    }

    /// Total bytes appended so far, header included. Threaded into finalize
    /// so metadata never depends on a post-hoc stat of the file.
    pub async fn bytes_written(&self) -> u64 {
        self.inner.lock().await.bytes_written
    }
}
