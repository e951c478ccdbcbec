//! Per-session recording lifecycle.
//!
//! A session owns its recorder and a one-shot deadline timer; the transport
//! handle is shared with the connection layer, not owned. When the deadline
//! fires the recording stops but the session stays open: the client keeps
//! an unrecorded terminal and is told about the switch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use termgate_core::replay::FrameChannel;
use termgate_core::{RecordingError, RecordingResult, RecordingState, SessionTarget, SessionType};

use crate::recorder::Recorder;

/// Connection-layer handle a session borrows for out-of-band notices and
/// teardown. Implementations must keep `close` idempotent: sessions are
/// closed from multiple sites (explicit close, timeout handler, shutdown).
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Push a human-readable notice to the connected client.
    async fn send_notice(&self, text: &str) -> RecordingResult<()>;
    /// Tear down the underlying connection.
    async fn close(&self) -> RecordingResult<()>;
}

/// Notice pushed when the recording window closes while the session lives on.
const TIMEOUT_NOTICE: &str =
    "recording reached its maximum duration and has been stopped; this session remains active";

struct SessionState {
    state: RecordingState,
    recorder: Option<Arc<Recorder>>,
    recording_id: Option<Uuid>,
    deadline: Option<JoinHandle<()>>,
}

/// One live interactive session and its recording state machine.
pub struct RecordingSession {
    id: Uuid,
    session_type: SessionType,
    target: SessionTarget,
    started_at: DateTime<Utc>,
    transport: Arc<dyn SessionTransport>,
    /// Shared with the deadline task, which transitions Active → TimedOut.
    state: Arc<Mutex<SessionState>>,
}

impl RecordingSession {
    pub fn new(
        id: Uuid,
        session_type: SessionType,
        target: SessionTarget,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        Self {
            id,
            session_type,
            target,
            started_at: Utc::now(),
            transport,
            state: Arc::new(Mutex::new(SessionState {
                state: RecordingState::Inactive,
                recorder: None,
                recording_id: None,
                deadline: None,
            })),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    pub fn cluster(&self) -> &str {
        &self.target.cluster
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub async fn recording_state(&self) -> RecordingState {
        self.state.lock().await.state
    }

    /// The metadata row and recorder bound to this session, for finalization
    /// after the recording ends.
    pub async fn recording_handle(&self) -> Option<(Uuid, Arc<Recorder>)> {
        let state = self.state.lock().await;
        match (state.recording_id, &state.recorder) {
            (Some(id), Some(recorder)) => Some((id, recorder.clone())),
            _ => None,
        }
    }

    /// Begin recording through `recorder` and arm the one-shot deadline.
    pub async fn start_recording(
        &self,
        recorder: Arc<Recorder>,
        recording_id: Uuid,
        window: Duration,
    ) -> RecordingResult<()> {
        let mut state = self.state.lock().await;
        if state.state != RecordingState::Inactive {
            return Err(RecordingError::Other(format!(
                "recording already started for session {}",
                self.id
            )));
        }
        state.state = RecordingState::Active;
        state.recorder = Some(recorder);
        state.recording_id = Some(recording_id);

        // The task owns clones of what it touches, never the session itself.
        let id = self.id;
        let shared = self.state.clone();
        let transport = self.transport.clone();
        state.deadline = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            deadline_elapsed(id, shared, transport).await;
        }));

        info!(
            session_id = %self.id,
            recording_id = %recording_id,
            window_secs = window.as_secs(),
            "recording started"
        );
        Ok(())
    }

    /// Append one frame. Silently ignored unless recording is active; only
    /// underlying recorder I/O failures propagate.
    pub async fn write_recording_frame(
        &self,
        channel: FrameChannel,
        payload: &str,
    ) -> RecordingResult<()> {
        let state = self.state.lock().await;
        if state.state != RecordingState::Active {
            return Ok(());
        }
        match &state.recorder {
            Some(recorder) => recorder.write_frame(channel, payload).await,
            None => Ok(()),
        }
    }

    /// Stop recording. Idempotent: on any state but `Active` this is a
    /// silent no-op. Cancels a pending deadline.
    pub async fn stop_recording(&self) -> RecordingResult<()> {
        let recorder = {
            let mut state = self.state.lock().await;
            if state.state != RecordingState::Active {
                return Ok(());
            }
            state.state = RecordingState::Stopped;
            if let Some(deadline) = state.deadline.take() {
                deadline.abort();
            }
            state.recorder.clone()
        };
        if let Some(recorder) = recorder {
            recorder.stop().await?;
        }
        info!(session_id = %self.id, "recording stopped");
        Ok(())
    }

    /// Tear the session down: always attempt to stop the recording first,
    /// then release the transport. Errors from both steps are aggregated,
    /// not suppressed. Safe to call from multiple sites.
    pub async fn close(&self) -> RecordingResult<()> {
        let mut failures = Vec::new();
        if let Err(e) = self.stop_recording().await {
            failures.push(format!("stop recording: {e}"));
        }
        if let Err(e) = self.transport.close().await {
            failures.push(format!("close transport: {e}"));
        }
        if failures.is_empty() {
            info!(session_id = %self.id, "session closed");
            Ok(())
        } else {
            Err(RecordingError::Other(format!(
                "closing session {}: {}",
                self.id,
                failures.join("; ")
            )))
        }
    }
}

/// Deadline fired: stop the recorder, keep the session running, and tell the
/// client (best-effort) that it is no longer being recorded.
async fn deadline_elapsed(
    session_id: Uuid,
    shared: Arc<Mutex<SessionState>>,
    transport: Arc<dyn SessionTransport>,
) {
    let recorder = {
        let mut state = shared.lock().await;
        if state.state != RecordingState::Active {
            return;
        }
        state.state = RecordingState::TimedOut;
        state.deadline = None;
        state.recorder.clone()
    };
    if let Some(recorder) = recorder {
        if let Err(e) = recorder.stop().await {
            warn!(session_id = %session_id, error = %e, "failed to stop recorder at deadline");
        }
    }
    info!(
        session_id = %session_id,
        "recording window elapsed; session continues without recording"
    );
    if let Err(e) = transport.send_notice(TIMEOUT_NOTICE).await {
        warn!(session_id = %session_id, error = %e, "failed to deliver timeout notice");
    }
}
