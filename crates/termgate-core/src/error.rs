use thiserror::Error;

/// Errors produced by the recording core.
///
/// A second `stop`/`finalize` on an already-finalized target is not an error
/// anywhere in the crate; the duplicate call is logged as a no-op.
#[derive(Debug, Error)]
pub enum RecordingError {
    /// No recording row or replay file for the requested id/path.
    #[error("recording not found: {0}")]
    NotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Playback or download was requested before the recording finalized.
    #[error("recording still in progress: {0}")]
    StillInProgress(String),

    /// Replay file failed structural validation.
    #[error("replay format error: {0}")]
    Format(String),

    /// The metadata store rejected or failed a query.
    #[error("repository error: {0}")]
    Repository(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type RecordingResult<T> = Result<T, RecordingError>;
