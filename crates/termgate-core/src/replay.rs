//! Replay file format.
//!
//! Bit-compatible with the asciicast v2 convention so transcripts open in
//! existing terminal-recording players: one JSON header line, then one JSON
//! array per frame `[elapsed_seconds, "o"|"i", payload]`.

use serde::{Deserialize, Serialize};

use crate::error::{RecordingError, RecordingResult};

/// Replay schema version (asciicast v2).
pub const REPLAY_VERSION: u32 = 2;

/// File extension for replay files.
pub const REPLAY_EXT: &str = "cast";

/// First line of a replay file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayHeader {
    pub version: u32,
    pub width: u16,
    pub height: u16,
    /// Unix seconds at recording start.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Direction of a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameChannel {
    /// Bytes sent to the client terminal.
    Output,
    /// Bytes received from the client.
    Input,
}

impl FrameChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameChannel::Output => "o",
            FrameChannel::Input => "i",
        }
    }
}

/// Encode one frame line (no trailing newline).
pub fn encode_frame(
    elapsed_seconds: f64,
    channel: FrameChannel,
    payload: &str,
) -> RecordingResult<String> {
    serde_json::to_string(&(elapsed_seconds, channel.as_str(), payload))
        .map_err(|e| RecordingError::Format(e.to_string()))
}

/// Frame lines sampled by the structural gate.
const FRAME_SAMPLE: usize = 3;

/// Cheap structural check: the header line is an object with the integral
/// fields a player needs, and the first few frame lines are array-shaped
/// with a numeric timestamp and string channel. A defensive gate, not a
/// full parse of every frame.
pub fn validate_structure(content: &str) -> RecordingResult<()> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());

    let header_line = lines
        .next()
        .ok_or_else(|| RecordingError::Format("empty replay file".into()))?;
    let header: serde_json::Value = serde_json::from_str(header_line)
        .map_err(|e| RecordingError::Format(format!("header is not valid JSON: {e}")))?;
    let obj = header
        .as_object()
        .ok_or_else(|| RecordingError::Format("header is not a JSON object".into()))?;
    for field in ["version", "width", "height"] {
        if !obj.get(field).map(serde_json::Value::is_u64).unwrap_or(false) {
            return Err(RecordingError::Format(format!(
                "header missing integral field `{field}`"
            )));
        }
    }

    for line in lines.take(FRAME_SAMPLE) {
        let frame: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| RecordingError::Format(format!("frame is not valid JSON: {e}")))?;
        let arr = frame
            .as_array()
            .ok_or_else(|| RecordingError::Format("frame is not a JSON array".into()))?;
        let shaped = arr.len() == 3 && arr[0].is_number() && arr[1].is_string();
        if !shaped {
            return Err(RecordingError::Format(
                "frame is not [seconds, channel, payload]".into(),
            ));
        }
    }

    Ok(())
}

/// Rewrite the header's width/height in an in-memory copy of a replay file.
/// Used to repair legacy recordings persisted with 0×0 geometry; the stored
/// file is left untouched. Unknown header fields are preserved.
pub fn rewrite_header_geometry(content: &[u8], cols: u16, rows: u16) -> RecordingResult<Vec<u8>> {
    let text = std::str::from_utf8(content)
        .map_err(|e| RecordingError::Format(format!("replay file is not UTF-8: {e}")))?;
    let (header_line, rest) = match text.split_once('\n') {
        Some((h, r)) => (h, r),
        None => (text, ""),
    };

    let mut header: serde_json::Value = serde_json::from_str(header_line)
        .map_err(|e| RecordingError::Format(format!("header is not valid JSON: {e}")))?;
    let obj = header
        .as_object_mut()
        .ok_or_else(|| RecordingError::Format("header is not a JSON object".into()))?;
    obj.insert("width".into(), serde_json::Value::from(cols));
    obj.insert("height".into(), serde_json::Value::from(rows));

    let mut out = serde_json::to_string(&header).map_err(|e| RecordingError::Format(e.to_string()))?;
    out.push('\n');
    out.push_str(rest);
    Ok(out.into_bytes())
}
