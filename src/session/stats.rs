use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about a relay session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier
    pub session_id: String,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Current signaling state (gateway mode only)
    pub signaling_state: Option<String>,

    /// Raw device bytes received
    pub bytes_in: u64,

    /// Normalized frames produced by the inbound adapter
    pub frames_in: u64,

    /// Device payloads dropped as malformed
    pub payloads_dropped: u64,

    /// Chunks accepted by the upload channel
    pub chunks_uploaded: u64,

    /// Chunks that needed the single resend
    pub upload_retries: u64,

    /// Text replies forwarded to the device
    pub text_events: u64,

    /// Audio payloads queued for playback
    pub audio_payloads: u64,

    /// Response events skipped as malformed
    pub events_dropped: u64,

    /// Frames emitted to the device, silence included
    pub frames_out: u64,

    /// Frames emitted as pure silence
    pub silence_frames: u64,
}

/// Lock-free counters shared by the tasks of one session
#[derive(Debug, Default)]
pub struct RelayCounters {
    pub bytes_in: AtomicU64,
    pub frames_in: AtomicU64,
    pub payloads_dropped: AtomicU64,
    pub chunks_uploaded: AtomicU64,
    pub upload_retries: AtomicU64,
    pub text_events: AtomicU64,
    pub audio_payloads: AtomicU64,
    pub events_dropped: AtomicU64,
    pub frames_out: AtomicU64,
    pub silence_frames: AtomicU64,
}

impl RelayCounters {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Copy the counters into a stats record
    pub fn snapshot(&self, session_id: &str, started_at: DateTime<Utc>) -> SessionStats {
        let duration_secs = (Utc::now() - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        SessionStats {
            session_id: session_id.to_string(),
            started_at,
            duration_secs,
            signaling_state: None,
            bytes_in: Self::get(&self.bytes_in),
            frames_in: Self::get(&self.frames_in),
            payloads_dropped: Self::get(&self.payloads_dropped),
            chunks_uploaded: Self::get(&self.chunks_uploaded),
            upload_retries: Self::get(&self.upload_retries),
            text_events: Self::get(&self.text_events),
            audio_payloads: Self::get(&self.audio_payloads),
            events_dropped: Self::get(&self.events_dropped),
            frames_out: Self::get(&self.frames_out),
            silence_frames: Self::get(&self.silence_frames),
        }
    }
}
