//! termgate-core: Shared library for the termgate session-recording core.
//!
//! Provides the error taxonomy, recording metadata types, and the replay
//! file format: header/frame encoding, structural validation, and the
//! in-memory header repair used for legacy recordings.

pub mod error;
pub mod replay;
pub mod types;

// Re-export commonly used items at crate root.
pub use error::{RecordingError, RecordingResult};
pub use replay::{FrameChannel, ReplayHeader, REPLAY_EXT, REPLAY_VERSION};
pub use types::{
    NewRecording, PageRequest, Recording, RecordingPage, RecordingQuery, RecordingState,
    RecordingStatistics, SessionTarget, SessionType,
};
