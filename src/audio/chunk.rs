use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::format::{samples_to_bytes, BYTES_PER_SAMPLE, DEFAULT_CHUNK_DURATION};
use super::frame::AudioFrame;
use crate::session::CancelToken;

/// Chunk configuration
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Buffered duration that triggers a chunk (default: 1 second)
    pub target_duration: Duration,
    /// Sample rate of incoming frames
    pub sample_rate: u32,
}

impl ChunkConfig {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            target_duration: DEFAULT_CHUNK_DURATION,
            sample_rate,
        }
    }

    fn target_samples(&self) -> usize {
        (self.sample_rate as u128 * self.target_duration.as_micros() / 1_000_000) as usize
    }
}

/// Consecutive frames spanning the target duration, ready for upload
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Monotonic per-session sequence number (starts at 1)
    pub sequence: u64,
    /// Wall-clock time the first frame of the chunk was buffered
    pub captured_at: DateTime<Utc>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Mono PCM samples
    pub samples: Vec<i16>,
    /// Flushed at end of stream (may be shorter than the target)
    pub is_final: bool,
}

impl AudioChunk {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / self.sample_rate as u64)
    }

    pub fn byte_len(&self) -> usize {
        self.samples.len() * BYTES_PER_SAMPLE
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        samples_to_bytes(&self.samples)
    }
}

/// Buffers frames until the target duration is reached
///
/// Emission is duration-driven, so frames of any size are accepted. A chunk
/// always consists of whole frames.
pub struct ChunkAccumulator {
    config: ChunkConfig,
    target_samples: usize,
    buffered: Vec<i16>,
    frames_in_chunk: usize,
    started_at: Option<DateTime<Utc>>,
    next_sequence: u64,
}

impl ChunkAccumulator {
    pub fn new(config: ChunkConfig) -> Self {
        let target_samples = config.target_samples().max(1);
        Self {
            buffered: Vec::with_capacity(target_samples),
            config,
            target_samples,
            frames_in_chunk: 0,
            started_at: None,
            next_sequence: 1,
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Buffer one frame
    pub fn push(&mut self, frame: AudioFrame) {
        if frame.sample_rate != self.config.sample_rate {
            warn!(
                "Frame sample rate {} differs from accumulator rate {}",
                frame.sample_rate, self.config.sample_rate
            );
        }
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.buffered.extend_from_slice(&frame.samples);
        self.frames_in_chunk += 1;
    }

    /// Whether the buffered duration has reached the target
    pub fn is_ready(&self) -> bool {
        self.buffered.len() >= self.target_samples
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffered.len()
    }

    pub fn buffered_duration(&self) -> Duration {
        if self.config.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.buffered.len() as u64 * 1_000_000 / self.config.sample_rate as u64)
    }

    /// Take a full chunk once the target is reached
    pub fn pop(&mut self) -> Option<AudioChunk> {
        if !self.is_ready() {
            return None;
        }
        Some(self.take(false))
    }

    /// Emit whatever remains as the final (possibly short) chunk
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if self.buffered.is_empty() {
            return None;
        }
        Some(self.take(true))
    }

    /// Drop buffered audio on session abort; returns the dropped sample count
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffered.len();
        self.buffered.clear();
        self.frames_in_chunk = 0;
        self.started_at = None;
        dropped
    }

    fn take(&mut self, is_final: bool) -> AudioChunk {
        let samples = std::mem::replace(&mut self.buffered, Vec::with_capacity(self.target_samples));
        let chunk = AudioChunk {
            sequence: self.next_sequence,
            captured_at: self.started_at.take().unwrap_or_else(Utc::now),
            sample_rate: self.config.sample_rate,
            samples,
            is_final,
        };
        debug!(
            "Chunk {} assembled from {} frames ({} samples, final={})",
            chunk.sequence,
            self.frames_in_chunk,
            chunk.samples.len(),
            is_final
        );
        self.next_sequence += 1;
        self.frames_in_chunk = 0;
        chunk
    }

    /// Drive the accumulator from a frame channel
    ///
    /// Completed chunks are sent downstream as soon as they are ready. When
    /// the frame channel closes the remainder is flushed as a final chunk;
    /// on cancellation it is discarded. Returns the number of chunks sent.
    pub async fn accumulate(
        &mut self,
        mut frames_rx: mpsc::Receiver<AudioFrame>,
        chunks_tx: mpsc::Sender<AudioChunk>,
        cancel: CancelToken,
    ) -> usize {
        let mut sent = 0;

        info!(
            "Chunk accumulation started ({}ms chunks)",
            self.config.target_duration.as_millis()
        );

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    let dropped = self.discard();
                    if dropped > 0 {
                        info!("Session aborted, discarded {} buffered samples", dropped);
                    }
                    return sent;
                }
                frame = frames_rx.recv() => frame,
            };

            let Some(frame) = frame else { break };
            self.push(frame);

            while let Some(chunk) = self.pop() {
                if !Self::forward(&chunks_tx, chunk, &cancel).await {
                    return sent;
                }
                sent += 1;
            }
        }

        if let Some(chunk) = self.flush() {
            info!(
                "Final chunk {} flushed ({:.2}s)",
                chunk.sequence,
                chunk.duration().as_secs_f64()
            );
            if Self::forward(&chunks_tx, chunk, &cancel).await {
                sent += 1;
            }
        }

        info!("Chunk accumulation complete: {} chunks", sent);
        sent
    }

    async fn forward(
        chunks_tx: &mpsc::Sender<AudioChunk>,
        chunk: AudioChunk,
        cancel: &CancelToken,
    ) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            result = chunks_tx.send(chunk) => {
                if result.is_err() {
                    warn!("Uplink stopped, dropping chunk stream");
                    return false;
                }
                true
            }
        }
    }
}
