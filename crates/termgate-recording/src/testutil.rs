//! Shared helpers for crate tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use termgate_core::{RecordingError, RecordingResult, SessionTarget, SessionType};

use crate::session::{RecordingSession, SessionTransport};

/// Transport stub that records notices and close calls.
#[derive(Default)]
pub struct TestTransport {
    pub notices: Mutex<Vec<String>>,
    pub closed: AtomicUsize,
    fail_close: bool,
}

impl TestTransport {
    /// A transport whose `close` always fails.
    pub fn failing() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl SessionTransport for TestTransport {
    async fn send_notice(&self, text: &str) -> RecordingResult<()> {
        self.notices.lock().await.push(text.to_string());
        Ok(())
    }

    async fn close(&self) -> RecordingResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(RecordingError::Transport("transport unreachable".into()));
        }
        Ok(())
    }
}

pub fn exec_target() -> SessionTarget {
    SessionTarget {
        cluster: "prod-eu".into(),
        node: None,
        namespace: Some("default".into()),
        pod: Some("api-0".into()),
        container: Some("app".into()),
    }
}

pub fn node_target(cluster: &str) -> SessionTarget {
    SessionTarget {
        cluster: cluster.into(),
        node: Some("node-1".into()),
        namespace: None,
        pod: None,
        container: None,
    }
}

pub fn node_session(cluster: &str, transport: Arc<TestTransport>) -> Arc<RecordingSession> {
    Arc::new(RecordingSession::new(
        Uuid::new_v4(),
        SessionType::NodeTerminal,
        node_target(cluster),
        transport,
    ))
}
