//! Concurrent directory of live sessions.
//!
//! The single structure touched by many concurrent callers; everything goes
//! through the inner lock. Listings are point-in-time snapshots, never live
//! views.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use termgate_core::{RecordingError, RecordingResult};

use crate::session::RecordingSession;

/// Concurrency-safe map from session id to live session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<RecordingSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session. Replacing a live id is a caller defect and logged.
    pub async fn add(&self, session: Arc<RecordingSession>) {
        let mut sessions = self.sessions.write().await;
        let id = session.id();
        if sessions.insert(id, session).is_some() {
            warn!(session_id = %id, "replaced existing session with the same id");
        }
        debug!(session_id = %id, total = sessions.len(), "session registered");
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<RecordingSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Remove and return a session. Missing ids return `None`; removal is
    /// idempotent across racing callers.
    pub async fn remove(&self, id: Uuid) -> Option<Arc<RecordingSession>> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            debug!(session_id = %id, "session removed");
        }
        removed
    }

    /// Point-in-time snapshot of all live sessions.
    pub async fn all_sessions(&self) -> Vec<Arc<RecordingSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Point-in-time snapshot of sessions connected through one cluster.
    pub async fn sessions_by_cluster(&self, cluster: &str) -> Vec<Arc<RecordingSession>> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.cluster() == cluster)
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Shutdown path: close every session, removing each as it closes.
    /// Collects every failure instead of stopping at the first.
    pub async fn close_all(&self) -> RecordingResult<()> {
        let ids: Vec<Uuid> = self.sessions.read().await.keys().copied().collect();
        let mut failures = Vec::new();
        let mut closed = 0usize;

        for id in ids {
            let Some(session) = self.remove(id).await else {
                continue;
            };
            match session.close().await {
                Ok(()) => closed += 1,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "session close failed during shutdown");
                    failures.push(e.to_string());
                }
            }
        }

        info!(closed, failed = failures.len(), "all sessions closed");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RecordingError::Other(format!(
                "{} session(s) failed to close: {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
