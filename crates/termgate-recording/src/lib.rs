//! termgate-recording: session-recording core of the termgate gateway.
//!
//! Captures interactive terminal sessions (container exec, node terminals)
//! into replay files, tracks live sessions, and manages persisted recording
//! metadata: playback, download, retention, and cleanup.
//!
//! The transport/authentication layer, the relational metadata store, and
//! the cleanup scheduler are external collaborators: the first borrows
//! [`session::RecordingSession`] handles, the second is consumed through
//! [`repository::RecordingRepository`], the third invokes
//! [`cleanup::CleanupEngine::run`] on a cadence.

pub mod cleanup;
pub mod config;
pub mod manager;
pub mod recorder;
pub mod registry;
pub mod repository;
pub mod session;
pub mod storage;

pub use cleanup::{CleanupEngine, CleanupReport};
pub use config::RecordingConfig;
pub use manager::{RecordingDownload, RecordingManager};
pub use recorder::{Geometry, Recorder};
pub use registry::SessionRegistry;
pub use repository::{MemoryRepository, RecordingRepository};
pub use session::{RecordingSession, SessionTransport};
pub use storage::{LocalStorage, StorageBackend, StoredRecording, WrittenRecording};

#[cfg(test)]
mod testutil;
