use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::{AudioFormat, DEFAULT_CHUNK_DURATION, DEFAULT_FRAME_DURATION};

/// Configuration for a relay session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "relay-3f0c...")
    pub session_id: String,

    /// Declared device input profile
    /// Default: 16 kHz mono
    pub input_format: AudioFormat,

    /// Cadence of the framer and the outbound track
    /// Default: 20 ms
    pub frame_duration: Duration,

    /// Audio per uploaded chunk
    /// Default: 1 second
    pub chunk_duration: Duration,

    /// Capacity of the frame, chunk and text channels
    pub channel_capacity: usize,

    /// Playback queue capacity in payloads
    pub playback_capacity: usize,

    /// Longest a downlink push may wait on a full playback queue
    pub playback_push_timeout: Duration,

    /// Pause before reopening the response stream
    pub reopen_delay: Duration,

    /// Opaque session options pushed to the inference service at start
    pub session_options: Option<serde_json::Value>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("relay-{}", uuid::Uuid::new_v4()),
            input_format: AudioFormat::default(),
            frame_duration: DEFAULT_FRAME_DURATION,
            chunk_duration: DEFAULT_CHUNK_DURATION,
            channel_capacity: 64,
            playback_capacity: 256,
            playback_push_timeout: Duration::from_secs(5),
            reopen_delay: Duration::from_millis(500),
            session_options: None,
        }
    }
}
