//! Metadata store boundary.
//!
//! The gateway's relational store is consumed through this narrow trait;
//! [`MemoryRepository`] backs tests and embedders that run without a
//! database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use termgate_core::{
    NewRecording, PageRequest, Recording, RecordingError, RecordingPage, RecordingQuery,
    RecordingResult, RecordingStatistics, SessionType,
};

/// Narrow interface over the persisted `Recording` entity.
#[async_trait]
pub trait RecordingRepository: Send + Sync {
    async fn create(&self, new: NewRecording) -> RecordingResult<Recording>;

    async fn get_by_id(&self, id: Uuid) -> RecordingResult<Option<Recording>>;

    async fn get_by_session_id(&self, session_id: Uuid) -> RecordingResult<Option<Recording>>;

    /// Newest-first page over all rows.
    async fn list(&self, page: PageRequest) -> RecordingResult<RecordingPage>;

    /// Newest-first page over rows matching `query`.
    async fn search(
        &self,
        query: &RecordingQuery,
        page: PageRequest,
    ) -> RecordingResult<RecordingPage>;

    /// Persist the finalization fields. The row's `ended_at` goes non-null
    /// here and nowhere else.
    async fn mark_finalized(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        duration_seconds: u64,
        file_size_bytes: u64,
    ) -> RecordingResult<()>;

    async fn delete(&self, id: Uuid) -> RecordingResult<()>;

    /// Delete many rows; returns how many existed.
    async fn bulk_delete(&self, ids: &[Uuid]) -> RecordingResult<u64>;

    /// Rows that can never replay: finalized with zero size or zero
    /// duration, or in-progress rows stale past the grace window.
    async fn find_invalid(&self, limit: usize) -> RecordingResult<Vec<Recording>>;

    /// Finalized rows whose `ended_at` is older than the retention window.
    async fn find_expired(
        &self,
        retention_days: u32,
        limit: usize,
    ) -> RecordingResult<Vec<Recording>>;

    async fn statistics(&self) -> RecordingResult<RecordingStatistics>;
}

/// Grace before an unfinalized row with no live session counts as abandoned.
const DEFAULT_STALE_GRACE_HOURS: i64 = 24;

/// In-memory repository.
pub struct MemoryRepository {
    rows: RwLock<HashMap<Uuid, Recording>>,
    stale_grace: Duration,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::with_stale_grace(Duration::hours(DEFAULT_STALE_GRACE_HOURS))
    }

    pub fn with_stale_grace(stale_grace: Duration) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            stale_grace,
        }
    }

    fn matches(query: &RecordingQuery, row: &Recording) -> bool {
        if let Some(username) = &query.username {
            if &row.username != username {
                return false;
            }
        }
        if let Some(recording_type) = query.recording_type {
            if row.recording_type != recording_type {
                return false;
            }
        }
        if let Some(after) = query.started_after {
            if row.started_at < after {
                return false;
            }
        }
        if let Some(before) = query.started_before {
            if row.started_at > before {
                return false;
            }
        }
        true
    }

    fn page_of(mut rows: Vec<Recording>, page: PageRequest) -> RecordingPage {
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        RecordingPage {
            items,
            total,
            page: page.page,
            limit: page.limit,
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordingRepository for MemoryRepository {
    async fn create(&self, new: NewRecording) -> RecordingResult<Recording> {
        let row = Recording {
            id: new.id,
            session_id: new.session_id,
            username: new.username,
            recording_type: new.recording_type,
            storage_path: new.storage_path,
            started_at: new.started_at,
            ended_at: None,
            duration_seconds: 0,
            file_size_bytes: 0,
            cols: new.cols,
            rows: new.rows,
        };
        let mut rows = self.rows.write().await;
        if rows.contains_key(&row.id) {
            return Err(RecordingError::Repository(format!(
                "duplicate recording id {}",
                row.id
            )));
        }
        rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&self, id: Uuid) -> RecordingResult<Option<Recording>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn get_by_session_id(&self, session_id: Uuid) -> RecordingResult<Option<Recording>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|r| r.session_id == session_id)
            .cloned())
    }

    async fn list(&self, page: PageRequest) -> RecordingResult<RecordingPage> {
        let rows: Vec<Recording> = self.rows.read().await.values().cloned().collect();
        Ok(Self::page_of(rows, page))
    }

    async fn search(
        &self,
        query: &RecordingQuery,
        page: PageRequest,
    ) -> RecordingResult<RecordingPage> {
        let rows: Vec<Recording> = self
            .rows
            .read()
            .await
            .values()
            .filter(|r| Self::matches(query, r))
            .cloned()
            .collect();
        Ok(Self::page_of(rows, page))
    }

    async fn mark_finalized(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
        duration_seconds: u64,
        file_size_bytes: u64,
    ) -> RecordingResult<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| RecordingError::NotFound(id.to_string()))?;
        row.ended_at = Some(ended_at);
        row.duration_seconds = duration_seconds;
        row.file_size_bytes = file_size_bytes;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RecordingResult<()> {
        self.rows.write().await.remove(&id);
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[Uuid]) -> RecordingResult<u64> {
        let mut rows = self.rows.write().await;
        let mut removed = 0;
        for id in ids {
            if rows.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn find_invalid(&self, limit: usize) -> RecordingResult<Vec<Recording>> {
        let now = Utc::now();
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| match r.ended_at {
                Some(_) => r.file_size_bytes == 0 || r.duration_seconds == 0,
                None => now - r.started_at > self.stale_grace,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_expired(
        &self,
        retention_days: u32,
        limit: usize,
    ) -> RecordingResult<Vec<Recording>> {
        let cutoff = Utc::now() - Duration::days(retention_days as i64);
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.ended_at.map(|e| e < cutoff).unwrap_or(false))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn statistics(&self) -> RecordingResult<RecordingStatistics> {
        let rows = self.rows.read().await;
        let mut stats = RecordingStatistics::default();
        for row in rows.values() {
            stats.total_count += 1;
            stats.total_size_bytes += row.file_size_bytes;
            stats.total_duration_seconds += row.duration_seconds;
            match row.recording_type {
                SessionType::NodeTerminal => stats.node_terminal_count += 1,
                SessionType::ContainerExec => stats.container_exec_count += 1,
            }
            if row.ended_at.is_none() {
                stats.in_progress_count += 1;
            }
        }
        Ok(stats)
    }
}
