//! Storage backends for replay files.
//!
//! The local filesystem backend ships with the gateway; the trait keeps the
//! subsystem pluggable (object storage, network mounts). Destinations are
//! computable before any byte is written, so metadata rows can reference
//! their replay path from the moment they are created.

mod local;

pub use local::LocalStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use termgate_core::RecordingResult;

/// Outcome of a whole-stream write.
#[derive(Debug, Clone)]
pub struct WrittenRecording {
    pub path: String,
    pub bytes_written: u64,
}

/// A stored replay file surfaced by an enumerable backend.
#[derive(Debug, Clone)]
pub struct StoredRecording {
    pub path: String,
    /// Session id recovered from the file name.
    pub session_id: Uuid,
}

/// Where replay files live.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write a complete replay stream for a session. The destination is the
    /// path `recording_path` reports for the same inputs.
    async fn write_recording(
        &self,
        session_id: Uuid,
        started_at: DateTime<Utc>,
        data: &[u8],
    ) -> RecordingResult<WrittenRecording>;

    /// Read a stored replay file. `NotFound` if absent.
    async fn read_recording(&self, path: &str) -> RecordingResult<Vec<u8>>;

    /// Size of a stored replay file in bytes. `NotFound` if absent.
    async fn recording_size(&self, path: &str) -> RecordingResult<u64>;

    /// Delete a stored replay file. Deleting a missing file is success.
    async fn delete_recording(&self, path: &str) -> RecordingResult<()>;

    /// Deterministic destination for a session's replay file. Pure: identical
    /// inputs yield identical paths, distinct session ids disjoint ones.
    fn recording_path(&self, session_id: Uuid, started_at: DateTime<Utc>) -> String;

    /// Create the storage root if missing. Idempotent.
    async fn ensure_base_dir(&self) -> RecordingResult<()>;

    /// Enumerate stored replay files where the backend supports listing.
    /// Backends that cannot enumerate (typical object stores) return
    /// `Ok(None)`; the orphan sweep skips them.
    async fn list_recordings(&self) -> RecordingResult<Option<Vec<StoredRecording>>> {
        Ok(None)
    }
}
