//! Recording subsystem configuration: TOML file + field defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use termgate_core::{RecordingError, RecordingResult};

/// `[recording]` section of the gateway config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    /// Root directory for replay files.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Days a finalized recording is kept before the expired sweep removes it.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Maximum seconds a session is recorded. When the window elapses the
    /// recorder stops but the session itself stays open.
    #[serde(default = "default_max_recording_secs")]
    pub max_recording_secs: u64,

    /// Geometry substituted at playback when a legacy row has no captured size.
    #[serde(default = "default_fallback_cols")]
    pub fallback_cols: u16,
    #[serde(default = "default_fallback_rows")]
    pub fallback_rows: u16,

    /// Rows fetched per repository batch during cleanup sweeps.
    #[serde(default = "default_cleanup_batch_size")]
    pub cleanup_batch_size: usize,

    /// Concurrent file-deletion workers per cleanup batch.
    #[serde(default = "default_cleanup_workers")]
    pub cleanup_workers: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            retention_days: default_retention_days(),
            max_recording_secs: default_max_recording_secs(),
            fallback_cols: default_fallback_cols(),
            fallback_rows: default_fallback_rows(),
            cleanup_batch_size: default_cleanup_batch_size(),
            cleanup_workers: default_cleanup_workers(),
        }
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("/var/lib/termgate/recordings")
}
fn default_retention_days() -> u32 {
    90
}
fn default_max_recording_secs() -> u64 {
    7200
}
fn default_fallback_cols() -> u16 {
    120
}
fn default_fallback_rows() -> u16 {
    30
}
fn default_cleanup_batch_size() -> usize {
    1000
}
fn default_cleanup_workers() -> usize {
    10
}

/// Top-level config file structure; other gateway sections are ignored here.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    recording: Option<RecordingConfig>,
}

impl RecordingConfig {
    /// Load the `[recording]` section from a TOML file. A missing file or
    /// missing section falls back to defaults.
    pub fn load(path: &Path) -> RecordingResult<Self> {
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        info!(path = %path.display(), "loading config file");
        let content = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&content)
            .map_err(|e| RecordingError::Other(format!("config parse error: {e}")))?;
        Ok(file.recording.unwrap_or_default())
    }

    /// The deadline window armed when recording starts.
    pub fn max_recording_window(&self) -> Duration {
        Duration::from_secs(self.max_recording_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = RecordingConfig::load(Path::new("/nonexistent/termgate.toml")).unwrap();
        assert_eq!(cfg.retention_days, 90);
        assert_eq!(cfg.max_recording_secs, 7200);
        assert_eq!(cfg.cleanup_batch_size, 1000);
    }

    #[test]
    fn partial_section_keeps_defaults_for_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("termgate.toml");
        std::fs::write(
            &path,
            "[recording]\nretention_days = 7\nbase_path = \"/tmp/replays\"\n",
        )
        .unwrap();

        let cfg = RecordingConfig::load(&path).unwrap();
        assert_eq!(cfg.retention_days, 7);
        assert_eq!(cfg.base_path, PathBuf::from("/tmp/replays"));
        assert_eq!(cfg.fallback_cols, 120);
        assert_eq!(cfg.fallback_rows, 30);
    }

    #[test]
    fn unrelated_sections_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("termgate.toml");
        std::fs::write(&path, "[server]\nport = 8443\n").unwrap();

        let cfg = RecordingConfig::load(&path).unwrap();
        assert_eq!(cfg.retention_days, 90);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("termgate.toml");
        std::fs::write(&path, "[recording\nretention_days = ").unwrap();
        assert!(RecordingConfig::load(&path).is_err());
    }
}
