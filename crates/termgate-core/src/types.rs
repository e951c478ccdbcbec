//! Recording metadata types shared across the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of interactive session being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Shell on a cluster node (bastion terminal).
    NodeTerminal,
    /// Exec into a running container.
    ContainerExec,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::NodeTerminal => "node_terminal",
            SessionType::ContainerExec => "container_exec",
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recording lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// Session exists, recording not started.
    Inactive,
    /// Frames are being appended.
    Active,
    /// Recording ended by an explicit stop or session close.
    Stopped,
    /// Recording hit the maximum window; the session itself stays open.
    TimedOut,
}

/// Where a session is connected. Node terminals carry a node name,
/// container execs carry namespace/pod/container coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTarget {
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

/// Persisted metadata describing one captured session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    pub session_id: Uuid,
    pub username: String,
    pub recording_type: SessionType,
    /// Backend path of the replay file, resolved at creation time.
    pub storage_path: String,
    pub started_at: DateTime<Utc>,
    /// `None` while the session is live, or forever if it never finalized.
    pub ended_at: Option<DateTime<Utc>>,
    /// Trustworthy only once `ended_at` is set.
    pub duration_seconds: u64,
    /// Trustworthy only once `ended_at` is set.
    pub file_size_bytes: u64,
    /// Terminal geometry at start. 0×0 on legacy rows predating capture.
    pub cols: u16,
    pub rows: u16,
}

impl Recording {
    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Insert payload for a new recording row.
#[derive(Debug, Clone)]
pub struct NewRecording {
    pub id: Uuid,
    pub session_id: Uuid,
    pub username: String,
    pub recording_type: SessionType,
    pub storage_path: String,
    pub started_at: DateTime<Utc>,
    pub cols: u16,
    pub rows: u16,
}

pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 100;

/// Pagination request as received from callers; `normalize` before use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub limit: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl PageRequest {
    /// Page floors at 1; a limit of 0 means "unspecified" and becomes the
    /// default, anything else clamps to [1, 100].
    pub fn normalize(self) -> PageRequest {
        PageRequest {
            page: self.page.max(1),
            limit: if self.limit == 0 {
                DEFAULT_PAGE_LIMIT
            } else {
                self.limit.min(MAX_PAGE_LIMIT)
            },
        }
    }

    /// Row offset of this page. Call on a normalized request.
    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1) * self.limit
    }
}

/// Search filters for recordings. All present fields are ANDed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_type: Option<SessionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_before: Option<DateTime<Utc>>,
}

/// One page of recordings plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingPage {
    pub items: Vec<Recording>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

/// Aggregate counters over all persisted recordings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingStatistics {
    pub total_count: u64,
    pub total_size_bytes: u64,
    pub total_duration_seconds: u64,
    pub node_terminal_count: u64,
    pub container_exec_count: u64,
    /// Rows with no `ended_at` yet.
    pub in_progress_count: u64,
}
