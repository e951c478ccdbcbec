//! Local-filesystem storage backend.
//!
//! Layout: `{base}/{YYYY-MM-DD}/{session_id}.cast`, date bucket taken from
//! the session start time.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use termgate_core::replay::REPLAY_EXT;
use termgate_core::{RecordingError, RecordingResult};

use super::{StorageBackend, StoredRecording, WrittenRecording};

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn bucket(started_at: DateTime<Utc>) -> String {
        started_at.format("%Y-%m-%d").to_string()
    }

    /// Best-effort removal of a date bucket left empty after a delete.
    async fn prune_bucket(&self, file: &Path) {
        let Some(dir) = file.parent() else { return };
        if dir == self.base_path {
            return;
        }
        let Ok(mut entries) = fs::read_dir(dir).await else {
            return;
        };
        match entries.next_entry().await {
            Ok(None) => match fs::remove_dir(dir).await {
                Ok(()) => debug!(dir = %dir.display(), "removed empty date bucket"),
                Err(e) => debug!(dir = %dir.display(), error = %e, "could not remove empty date bucket"),
            },
            _ => {}
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn write_recording(
        &self,
        session_id: Uuid,
        started_at: DateTime<Utc>,
        data: &[u8],
    ) -> RecordingResult<WrittenRecording> {
        let path = self.recording_path(session_id, started_at);
        let full = PathBuf::from(&path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, data).await?;
        debug!(path = %path, bytes = data.len(), "replay file written");
        Ok(WrittenRecording {
            path,
            bytes_written: data.len() as u64,
        })
    }

    async fn read_recording(&self, path: &str) -> RecordingResult<Vec<u8>> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RecordingError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recording_size(&self, path: &str) -> RecordingResult<u64> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RecordingError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_recording(&self, path: &str) -> RecordingResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path, "replay file deleted");
                self.prune_bucket(Path::new(path)).await;
                Ok(())
            }
            // Already gone counts as deleted.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn recording_path(&self, session_id: Uuid, started_at: DateTime<Utc>) -> String {
        self.base_path
            .join(Self::bucket(started_at))
            .join(format!("{session_id}.{REPLAY_EXT}"))
            .to_string_lossy()
            .into_owned()
    }

    async fn ensure_base_dir(&self) -> RecordingResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    async fn list_recordings(&self) -> RecordingResult<Option<Vec<StoredRecording>>> {
        let mut found = Vec::new();
        let mut buckets = match fs::read_dir(&self.base_path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Some(found)),
            Err(e) => return Err(e.into()),
        };

        while let Some(bucket) = buckets.next_entry().await? {
            if !bucket.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(bucket.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(REPLAY_EXT) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match stem.parse::<Uuid>() {
                    Ok(session_id) => found.push(StoredRecording {
                        path: path.to_string_lossy().into_owned(),
                        session_id,
                    }),
                    Err(_) => {
                        debug!(path = %path.display(), "skipping non-replay file in storage root")
                    }
                }
            }
        }
        Ok(Some(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 10, 15, 0).unwrap()
    }

    #[tokio::test]
    async fn paths_are_pure_and_disjoint() {
        let storage = LocalStorage::new("/data/replays");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(
            storage.recording_path(a, start()),
            storage.recording_path(a, start())
        );
        assert_ne!(
            storage.recording_path(a, start()),
            storage.recording_path(b, start())
        );
        assert_eq!(
            storage.recording_path(a, start()),
            format!("/data/replays/2026-08-07/{a}.cast")
        );
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let id = Uuid::new_v4();

        let written = storage
            .write_recording(id, start(), b"header\nframe\n")
            .await
            .unwrap();
        assert_eq!(written.bytes_written, 13);
        assert_eq!(written.path, storage.recording_path(id, start()));

        let data = storage.read_recording(&written.path).await.unwrap();
        assert_eq!(data, b"header\nframe\n");
        assert_eq!(storage.recording_size(&written.path).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn read_of_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let missing = storage.recording_path(Uuid::new_v4(), start());

        assert!(matches!(
            storage.read_recording(&missing).await,
            Err(RecordingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_of_missing_path_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let missing = storage.recording_path(Uuid::new_v4(), start());

        storage.delete_recording(&missing).await.unwrap();
    }

    #[tokio::test]
    async fn delete_prunes_bucket_only_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let first = storage
            .write_recording(Uuid::new_v4(), start(), b"a")
            .await
            .unwrap();
        let second = storage
            .write_recording(Uuid::new_v4(), start(), b"b")
            .await
            .unwrap();
        let bucket = dir.path().join("2026-08-07");

        storage.delete_recording(&first.path).await.unwrap();
        assert!(bucket.exists(), "bucket still holds the second file");

        storage.delete_recording(&second.path).await.unwrap();
        assert!(!bucket.exists(), "empty bucket is pruned");
    }

    #[tokio::test]
    async fn ensure_base_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("replays"));
        storage.ensure_base_dir().await.unwrap();
        storage.ensure_base_dir().await.unwrap();
        assert!(dir.path().join("replays").is_dir());
    }

    #[tokio::test]
    async fn enumeration_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let id = Uuid::new_v4();
        storage.write_recording(id, start(), b"data").await.unwrap();

        let bucket = dir.path().join("2026-08-07");
        std::fs::write(bucket.join("notes.txt"), "x").unwrap();
        std::fs::write(bucket.join("not-a-uuid.cast"), "x").unwrap();
        std::fs::write(dir.path().join("stray.cast"), "x").unwrap();

        let listed = storage.list_recordings().await.unwrap().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_id, id);
    }

    #[tokio::test]
    async fn enumeration_of_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("never-created"));
        assert_eq!(storage.list_recordings().await.unwrap().unwrap().len(), 0);
    }
}
