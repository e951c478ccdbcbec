//! Recording manager: the query/playback/lifecycle facade over persisted
//! metadata and the storage backend.
//!
//! Constructed with its collaborators and handed to the gateway; nothing in
//! here reaches for ambient globals.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use termgate_core::replay::{self, REPLAY_EXT};
use termgate_core::{
    NewRecording, PageRequest, Recording, RecordingError, RecordingPage, RecordingQuery,
    RecordingResult, RecordingStatistics, SessionType,
};

use crate::config::RecordingConfig;
use crate::repository::RecordingRepository;
use crate::storage::StorageBackend;

/// Playback content plus the filename a browser download should carry.
#[derive(Debug, Clone)]
pub struct RecordingDownload {
    pub filename: String,
    pub content: Vec<u8>,
}

pub struct RecordingManager {
    repository: Arc<dyn RecordingRepository>,
    storage: Arc<dyn StorageBackend>,
    config: RecordingConfig,
}

impl RecordingManager {
    pub fn new(
        repository: Arc<dyn RecordingRepository>,
        storage: Arc<dyn StorageBackend>,
        config: RecordingConfig,
    ) -> Self {
        Self {
            repository,
            storage,
            config,
        }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Newest-first page over all recordings.
    pub async fn list(&self, page: PageRequest) -> RecordingResult<RecordingPage> {
        self.repository.list(page.normalize()).await
    }

    /// Newest-first page over recordings matching `query`.
    pub async fn search(
        &self,
        query: &RecordingQuery,
        page: PageRequest,
    ) -> RecordingResult<RecordingPage> {
        self.repository.search(query, page.normalize()).await
    }

    pub async fn get(&self, id: Uuid) -> RecordingResult<Recording> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| RecordingError::NotFound(id.to_string()))
    }

    pub async fn statistics(&self) -> RecordingResult<RecordingStatistics> {
        self.repository.statistics().await
    }

    /// Create the metadata row for a session that is about to record. The
    /// replay path is resolved from the storage backend BEFORE the row is
    /// written, so the path stays resolvable even if finalize never happens
    /// (abrupt process death still leaves a discoverable trail).
    pub async fn create(
        &self,
        session_id: Uuid,
        username: &str,
        recording_type: SessionType,
        started_at: DateTime<Utc>,
        cols: u16,
        rows: u16,
    ) -> RecordingResult<Recording> {
        let storage_path = self.storage.recording_path(session_id, started_at);
        let recording = self
            .repository
            .create(NewRecording {
                id: Uuid::new_v4(),
                session_id,
                username: username.to_string(),
                recording_type,
                storage_path,
                started_at,
                cols,
                rows,
            })
            .await?;
        info!(
            recording_id = %recording.id,
            session_id = %session_id,
            username = %username,
            path = %recording.storage_path,
            "recording created"
        );
        Ok(recording)
    }

    /// Persist the final duration and size. Idempotent: a second finalize of
    /// the same row is a logged no-op. The size comes from the recorder's
    /// threaded byte counter when available, else from a stat of the actual
    /// file, never from caller-supplied metadata.
    pub async fn finalize(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        duration: Duration,
        bytes_written: Option<u64>,
    ) -> RecordingResult<()> {
        let recording = self.get(id).await?;
        if recording.is_finalized() {
            info!(recording_id = %id, "finalize on already-finalized recording; ignoring");
            return Ok(());
        }

        let file_size = match bytes_written {
            Some(n) => n,
            None => match self.storage.recording_size(&recording.storage_path).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(
                        recording_id = %id,
                        path = %recording.storage_path,
                        error = %e,
                        "could not stat replay file at finalize"
                    );
                    0
                }
            },
        };

        self.repository
            .mark_finalized(id, ended_at, duration.as_secs(), file_size)
            .await?;
        info!(
            recording_id = %id,
            duration_secs = duration.as_secs(),
            bytes = file_size,
            "recording finalized"
        );
        Ok(())
    }

    /// Delete a recording: the replay file first (best-effort, logged on
    /// failure), then always the metadata row.
    pub async fn delete(&self, id: Uuid) -> RecordingResult<()> {
        let recording = self.get(id).await?;
        if let Err(e) = self
            .storage
            .delete_recording(&recording.storage_path)
            .await
        {
            warn!(
                recording_id = %id,
                path = %recording.storage_path,
                error = %e,
                "replay file delete failed; removing metadata anyway"
            );
        }
        self.repository.delete(id).await?;
        info!(recording_id = %id, "recording deleted");
        Ok(())
    }

    /// Raw replay content for playback. In-progress recordings return
    /// `StillInProgress`, never an empty stream. Legacy rows persisted with
    /// 0×0 geometry get their header repaired in memory from the configured
    /// fallback; the stored file is untouched.
    pub async fn playback_content(&self, id: Uuid) -> RecordingResult<Vec<u8>> {
        let recording = self.get(id).await?;
        if !recording.is_finalized() {
            return Err(RecordingError::StillInProgress(id.to_string()));
        }

        let content = self.storage.read_recording(&recording.storage_path).await?;
        if recording.cols == 0 || recording.rows == 0 {
            return replay::rewrite_header_geometry(
                &content,
                self.config.fallback_cols,
                self.config.fallback_rows,
            );
        }
        Ok(content)
    }

    /// Playback content plus a synthesized `{username}_{type}_{startedAt}`
    /// filename.
    pub async fn download(&self, id: Uuid) -> RecordingResult<RecordingDownload> {
        let recording = self.get(id).await?;
        let content = self.playback_content(id).await?;
        let filename = format!(
            "{}_{}_{}.{}",
            sanitize(&recording.username),
            recording.recording_type,
            recording.started_at.format("%Y%m%d-%H%M%S"),
            REPLAY_EXT
        );
        Ok(RecordingDownload { filename, content })
    }

    /// Structural validation of replay content. A defensive gate for uploads
    /// and pre-playback checks, not a full parser.
    pub fn validate_format(&self, content: &[u8]) -> RecordingResult<()> {
        let text = std::str::from_utf8(content)
            .map_err(|e| RecordingError::Format(format!("replay file is not UTF-8: {e}")))?;
        replay::validate_structure(text)
    }
}

/// Keep synthesized filenames filesystem- and header-safe.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{Geometry, Recorder};
    use crate::repository::MemoryRepository;
    use crate::storage::{LocalStorage, StorageBackend, StoredRecording, WrittenRecording};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use termgate_core::replay::{encode_frame, FrameChannel, ReplayHeader, REPLAY_VERSION};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 10, 15, 0).unwrap()
    }

    fn manager_over(dir: &tempfile::TempDir) -> (RecordingManager, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let storage = Arc::new(LocalStorage::new(dir.path()));
        let config = RecordingConfig {
            base_path: dir.path().to_path_buf(),
            ..RecordingConfig::default()
        };
        (
            RecordingManager::new(repo.clone(), storage, config),
            repo,
        )
    }

    fn sample_replay(width: u16, height: u16) -> Vec<u8> {
        let header = serde_json::to_string(&ReplayHeader {
            version: REPLAY_VERSION,
            width,
            height,
            timestamp: start().timestamp(),
            title: None,
        })
        .unwrap();
        let f1 = encode_frame(0.0, FrameChannel::Output, "hi").unwrap();
        let f2 = encode_frame(0.5, FrameChannel::Output, "there").unwrap();
        format!("{header}\n{f1}\n{f2}\n").into_bytes()
    }

    #[tokio::test]
    async fn create_resolves_storage_path_before_the_row_exists() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        let storage = LocalStorage::new(dir.path());
        let session_id = Uuid::new_v4();

        let recording = manager
            .create(session_id, "alice", SessionType::ContainerExec, start(), 80, 24)
            .await
            .unwrap();

        assert_eq!(
            recording.storage_path,
            storage.recording_path(session_id, start())
        );
        assert!(recording.ended_at.is_none());
    }

    #[tokio::test]
    async fn finalize_is_idempotent_and_stats_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        let storage = LocalStorage::new(dir.path());
        let session_id = Uuid::new_v4();

        let recording = manager
            .create(session_id, "alice", SessionType::ContainerExec, start(), 80, 24)
            .await
            .unwrap();
        let written = storage
            .write_recording(session_id, start(), &sample_replay(80, 24))
            .await
            .unwrap();

        manager
            .finalize(recording.id, Utc::now(), Duration::from_secs(30), None)
            .await
            .unwrap();
        let finalized = manager.get(recording.id).await.unwrap();
        assert_eq!(finalized.file_size_bytes, written.bytes_written);
        assert_eq!(finalized.duration_seconds, 30);

        // Second finalize with different values changes nothing.
        manager
            .finalize(recording.id, Utc::now(), Duration::from_secs(999), Some(7))
            .await
            .unwrap();
        let after = manager.get(recording.id).await.unwrap();
        assert_eq!(after.file_size_bytes, written.bytes_written);
        assert_eq!(after.duration_seconds, 30);
        assert_eq!(after.ended_at, finalized.ended_at);
    }

    #[tokio::test]
    async fn finalize_prefers_the_threaded_byte_counter() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        let recording = manager
            .create(Uuid::new_v4(), "alice", SessionType::NodeTerminal, start(), 80, 24)
            .await
            .unwrap();

        manager
            .finalize(recording.id, Utc::now(), Duration::from_secs(5), Some(4242))
            .await
            .unwrap();
        assert_eq!(
            manager.get(recording.id).await.unwrap().file_size_bytes,
            4242
        );
    }

    #[tokio::test]
    async fn finalize_of_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        assert!(matches!(
            manager
                .finalize(Uuid::new_v4(), Utc::now(), Duration::from_secs(1), None)
                .await,
            Err(RecordingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_file_then_row() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, repo) = manager_over(&dir);
        let storage = LocalStorage::new(dir.path());
        let session_id = Uuid::new_v4();

        let recording = manager
            .create(session_id, "alice", SessionType::ContainerExec, start(), 80, 24)
            .await
            .unwrap();
        let written = storage
            .write_recording(session_id, start(), b"data")
            .await
            .unwrap();

        manager.delete(recording.id).await.unwrap();
        assert!(!std::path::Path::new(&written.path).exists());
        assert!(repo.get_by_id(recording.id).await.unwrap().is_none());
    }

    /// Storage stub whose deletes always fail.
    struct BrokenDeleteStorage(LocalStorage);

    #[async_trait]
    impl crate::storage::StorageBackend for BrokenDeleteStorage {
        async fn write_recording(
            &self,
            session_id: Uuid,
            started_at: DateTime<Utc>,
            data: &[u8],
        ) -> RecordingResult<WrittenRecording> {
            self.0.write_recording(session_id, started_at, data).await
        }
        async fn read_recording(&self, path: &str) -> RecordingResult<Vec<u8>> {
            self.0.read_recording(path).await
        }
        async fn recording_size(&self, path: &str) -> RecordingResult<u64> {
            self.0.recording_size(path).await
        }
        async fn delete_recording(&self, _path: &str) -> RecordingResult<()> {
            Err(RecordingError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only volume",
            )))
        }
        fn recording_path(&self, session_id: Uuid, started_at: DateTime<Utc>) -> String {
            self.0.recording_path(session_id, started_at)
        }
        async fn ensure_base_dir(&self) -> RecordingResult<()> {
            self.0.ensure_base_dir().await
        }
        async fn list_recordings(&self) -> RecordingResult<Option<Vec<StoredRecording>>> {
            self.0.list_recordings().await
        }
    }

    #[tokio::test]
    async fn delete_removes_row_even_when_file_delete_fails() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemoryRepository::new());
        let storage = Arc::new(BrokenDeleteStorage(LocalStorage::new(dir.path())));
        let manager = RecordingManager::new(
            repo.clone(),
            storage.clone(),
            RecordingConfig::default(),
        );
        let session_id = Uuid::new_v4();

        let recording = manager
            .create(session_id, "alice", SessionType::NodeTerminal, start(), 80, 24)
            .await
            .unwrap();
        storage
            .write_recording(session_id, start(), b"data")
            .await
            .unwrap();

        manager.delete(recording.id).await.unwrap();
        assert!(repo.get_by_id(recording.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn playback_of_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        assert!(matches!(
            manager.playback_content(Uuid::new_v4()).await,
            Err(RecordingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn playback_before_finalize_is_still_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        let recording = manager
            .create(Uuid::new_v4(), "alice", SessionType::NodeTerminal, start(), 80, 24)
            .await
            .unwrap();

        assert!(matches!(
            manager.playback_content(recording.id).await,
            Err(RecordingError::StillInProgress(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn playback_returns_header_and_both_frames() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        let storage = LocalStorage::new(dir.path());
        let session_id = Uuid::new_v4();

        // Record through the real recorder at the backend-resolved path.
        let recording = manager
            .create(session_id, "alice", SessionType::ContainerExec, start(), 80, 24)
            .await
            .unwrap();
        let recorder = Recorder::open(
            storage.recording_path(session_id, start()),
            Geometry { cols: 80, rows: 24 },
            None,
        )
        .await
        .unwrap();
        recorder.write_frame(FrameChannel::Output, "hi").await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        recorder
            .write_frame(FrameChannel::Output, "there")
            .await
            .unwrap();
        recorder.stop().await.unwrap();
        manager
            .finalize(
                recording.id,
                Utc::now(),
                recorder.duration().await,
                Some(recorder.bytes_written().await),
            )
            .await
            .unwrap();

        let content = manager.playback_content(recording.id).await.unwrap();
        let text = String::from_utf8(content).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);

        let header: ReplayHeader = serde_json::from_str(lines[0]).unwrap();
        assert_eq!((header.width, header.height), (80, 24));
        let f1: (f64, String, String) = serde_json::from_str(lines[1]).unwrap();
        let f2: (f64, String, String) = serde_json::from_str(lines[2]).unwrap();
        assert_eq!((f1.0, f1.2.as_str()), (0.0, "hi"));
        assert_eq!((f2.0, f2.2.as_str()), (0.5, "there"));
    }

    #[tokio::test]
    async fn legacy_zero_geometry_is_repaired_in_memory_only() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        let storage = LocalStorage::new(dir.path());
        let session_id = Uuid::new_v4();

        // Legacy row: geometry was never captured.
        let recording = manager
            .create(session_id, "alice", SessionType::NodeTerminal, start(), 0, 0)
            .await
            .unwrap();
        let written = storage
            .write_recording(session_id, start(), &sample_replay(0, 0))
            .await
            .unwrap();
        manager
            .finalize(recording.id, Utc::now(), Duration::from_secs(1), None)
            .await
            .unwrap();

        let content = manager.playback_content(recording.id).await.unwrap();
        let text = String::from_utf8(content).unwrap();
        let header: ReplayHeader = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!((header.width, header.height), (120, 30));

        // Stored file still carries the legacy header.
        let stored = storage.read_recording(&written.path).await.unwrap();
        let stored_header: ReplayHeader =
            serde_json::from_str(String::from_utf8(stored).unwrap().lines().next().unwrap())
                .unwrap();
        assert_eq!((stored_header.width, stored_header.height), (0, 0));
    }

    #[tokio::test]
    async fn download_synthesizes_a_safe_filename() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        let storage = LocalStorage::new(dir.path());
        let session_id = Uuid::new_v4();

        let recording = manager
            .create(
                session_id,
                "alice/o'hara",
                SessionType::ContainerExec,
                start(),
                80,
                24,
            )
            .await
            .unwrap();
        storage
            .write_recording(session_id, start(), &sample_replay(80, 24))
            .await
            .unwrap();
        manager
            .finalize(recording.id, Utc::now(), Duration::from_secs(1), None)
            .await
            .unwrap();

        let download = manager.download(recording.id).await.unwrap();
        assert_eq!(
            download.filename,
            "alice-o-hara_container_exec_20260807-101500.cast"
        );
        assert!(!download.content.is_empty());
    }

    #[tokio::test]
    async fn validate_format_gates_structurally() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);

        manager.validate_format(&sample_replay(80, 24)).unwrap();
        assert!(matches!(
            manager.validate_format(b"not a replay"),
            Err(RecordingError::Format(_))
        ));
        assert!(manager.validate_format(&[0xff, 0xfe]).is_err());
    }

    #[tokio::test]
    async fn full_session_lifecycle_round_trip() {
        use crate::registry::SessionRegistry;
        use crate::session::RecordingSession;
        use crate::testutil::{exec_target, TestTransport};

        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        let storage = LocalStorage::new(dir.path());
        let registry = SessionRegistry::new();

        // Transport attaches: session and metadata row come up together.
        let transport = Arc::new(TestTransport::default());
        let session = Arc::new(RecordingSession::new(
            Uuid::new_v4(),
            SessionType::ContainerExec,
            exec_target(),
            transport,
        ));
        registry.add(session.clone()).await;
        let recording = manager
            .create(
                session.id(),
                "alice",
                SessionType::ContainerExec,
                start(),
                80,
                24,
            )
            .await
            .unwrap();

        let recorder = Arc::new(
            Recorder::open(
                storage.recording_path(session.id(), start()),
                Geometry { cols: 80, rows: 24 },
                None,
            )
            .await
            .unwrap(),
        );
        session
            .start_recording(recorder, recording.id, std::time::Duration::from_secs(7200))
            .await
            .unwrap();
        session
            .write_recording_frame(FrameChannel::Output, "$ ")
            .await
            .unwrap();
        session
            .write_recording_frame(FrameChannel::Input, "exit\r")
            .await
            .unwrap();

        // Disconnect: close the session, then persist final metadata.
        session.close().await.unwrap();
        let (recording_id, recorder) = session.recording_handle().await.unwrap();
        manager
            .finalize(
                recording_id,
                Utc::now(),
                recorder.duration().await,
                Some(recorder.bytes_written().await),
            )
            .await
            .unwrap();
        registry.remove(session.id()).await.unwrap();

        let finalized = manager.get(recording_id).await.unwrap();
        assert!(finalized.is_finalized());
        assert!(finalized.file_size_bytes > 0);

        let content = manager.playback_content(recording_id).await.unwrap();
        let text = String::from_utf8(content).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[tokio::test]
    async fn list_and_search_normalize_pagination() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = manager_over(&dir);
        for _ in 0..3 {
            manager
                .create(Uuid::new_v4(), "alice", SessionType::NodeTerminal, start(), 80, 24)
                .await
                .unwrap();
        }

        // page 0 / limit 0 become page 1 / default limit.
        let page = manager
            .list(PageRequest { page: 0, limit: 0 })
            .await
            .unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 20);
        assert_eq!(page.items.len(), 3);

        // Oversized limits clamp to 100.
        let page = manager
            .search(
                &RecordingQuery::default(),
                PageRequest {
                    page: 1,
                    limit: 100_000,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.limit, 100);
    }
}
