//! Background reclamation of invalid, expired, and orphaned recordings.
//!
//! Invoked on a cadence by an external scheduler; never self-scheduling.
//! Safe to run alongside live sessions: only rows that are already
//! finalized, stale, or orphaned are touched, and anything with a live
//! session in the registry is skipped outright.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use termgate_core::{Recording, RecordingResult};

use crate::config::RecordingConfig;
use crate::registry::SessionRegistry;
use crate::repository::RecordingRepository;
use crate::storage::StorageBackend;

/// Counts from one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub invalid_deleted: u64,
    pub expired_deleted: u64,
    pub orphan_files_deleted: u64,
}

pub struct CleanupEngine {
    repository: Arc<dyn RecordingRepository>,
    storage: Arc<dyn StorageBackend>,
    registry: Arc<SessionRegistry>,
    retention_days: u32,
    batch_size: usize,
    workers: usize,
}

impl CleanupEngine {
    pub fn new(
        repository: Arc<dyn RecordingRepository>,
        storage: Arc<dyn StorageBackend>,
        registry: Arc<SessionRegistry>,
        config: &RecordingConfig,
    ) -> Self {
        Self {
            repository,
            storage,
            registry,
            retention_days: config.retention_days,
            batch_size: config.cleanup_batch_size.max(1),
            workers: config.cleanup_workers.max(1),
        }
    }

    /// Execute all three sweeps sequentially and report the counts. Only a
    /// repository query failure aborts a run; individual file failures are
    /// logged and tallied around.
    pub async fn run(&self) -> RecordingResult<CleanupReport> {
        let invalid_deleted = self.sweep_invalid().await?;
        let expired_deleted = self.sweep_expired().await?;
        let orphan_files_deleted = self.sweep_orphans().await?;

        let report = CleanupReport {
            invalid_deleted,
            expired_deleted,
            orphan_files_deleted,
        };
        info!(
            invalid = report.invalid_deleted,
            expired = report.expired_deleted,
            orphans = report.orphan_files_deleted,
            "cleanup run complete"
        );
        Ok(report)
    }

    /// Recordings that can never replay: zero size or zero duration, plus
    /// in-progress rows abandoned past the repository's grace window.
    async fn sweep_invalid(&self) -> RecordingResult<u64> {
        let mut deleted = 0u64;
        loop {
            let batch = self.repository.find_invalid(self.batch_size).await?;
            let fetched = batch.len();
            let removed = self.delete_batch(batch, "invalid").await?;
            deleted += removed;
            // A short batch means the backlog is drained. A full batch that
            // removed nothing means every remaining row is protected by a
            // live session; stop rather than spin.
            if fetched < self.batch_size || removed == 0 {
                break;
            }
        }
        Ok(deleted)
    }

    /// Finalized recordings older than the retention window.
    async fn sweep_expired(&self) -> RecordingResult<u64> {
        let mut deleted = 0u64;
        loop {
            let batch = self
                .repository
                .find_expired(self.retention_days, self.batch_size)
                .await?;
            let fetched = batch.len();
            let removed = self.delete_batch(batch, "expired").await?;
            deleted += removed;
            if fetched < self.batch_size || removed == 0 {
                break;
            }
        }
        Ok(deleted)
    }

    /// Replay files with no metadata row. Needs an enumerable backend; the
    /// sweep deletes files only, never rows.
    async fn sweep_orphans(&self) -> RecordingResult<u64> {
        let Some(stored) = self.storage.list_recordings().await? else {
            debug!("storage backend cannot enumerate; skipping orphan sweep");
            return Ok(0);
        };

        let mut orphans = Vec::new();
        for file in stored {
            if self.registry.contains(file.session_id).await {
                continue;
            }
            if self
                .repository
                .get_by_session_id(file.session_id)
                .await?
                .is_none()
            {
                debug!(path = %file.path, session_id = %file.session_id, "orphan replay file");
                orphans.push(file.path);
            }
        }
        Ok(self.delete_files(orphans).await)
    }

    /// Delete one batch of rows: files through the worker pool, then the
    /// rows in bulk. Rows whose session is still live are skipped.
    async fn delete_batch(&self, batch: Vec<Recording>, sweep: &str) -> RecordingResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut ids = Vec::with_capacity(batch.len());
        let mut paths = Vec::with_capacity(batch.len());
        for recording in batch {
            if self.registry.contains(recording.session_id).await {
                debug!(
                    recording_id = %recording.id,
                    session_id = %recording.session_id,
                    sweep,
                    "skipping row with live session"
                );
                continue;
            }
            ids.push(recording.id);
            paths.push(recording.storage_path);
        }
        if ids.is_empty() {
            return Ok(0);
        }

        let files_deleted = self.delete_files(paths).await;
        let rows_deleted = self.repository.bulk_delete(&ids).await?;
        info!(sweep, rows = rows_deleted, files = files_deleted, "cleanup batch deleted");
        Ok(rows_deleted)
    }

    /// Drain `paths` through a fixed pool of deletion workers. Each failure
    /// is logged and skipped; one bad file never aborts the batch.
    async fn delete_files(&self, paths: Vec<String>) -> u64 {
        if paths.is_empty() {
            return 0;
        }

        let queue = Arc::new(tokio::sync::Mutex::new(VecDeque::from(paths)));
        let deleted = Arc::new(AtomicU64::new(0));
        let mut workers = Vec::with_capacity(self.workers);

        for _ in 0..self.workers {
            let queue = queue.clone();
            let deleted = deleted.clone();
            let storage = self.storage.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let Some(path) = queue.lock().await.pop_front() else {
                        break;
                    };
                    match storage.delete_recording(&path).await {
                        Ok(()) => {
                            deleted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => warn!(path = %path, error = %e, "replay file delete failed"),
                    }
                }
            }));
        }
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "cleanup deletion worker panicked");
            }
        }

        deleted.load(Ordering::Relaxed)
    }
}
