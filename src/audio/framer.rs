use std::time::Duration;

use super::format::{bytes_to_samples, AudioFormat, BYTES_PER_SAMPLE};
use super::frame::AudioFrame;

/// Splits a continuous PCM byte stream into fixed-duration frames
///
/// One instance per stream: bytes that do not fill a whole frame (including
/// half a sample) are carried into the next `push`, never dropped.
#[derive(Debug)]
pub struct AudioFramer {
    sample_rate: u32,
    frame_bytes: usize,
    remainder: Vec<u8>,
    emitted_samples: u64,
}

impl AudioFramer {
    /// Create a framer for mono PCM at `format.sample_rate`
    pub fn new(format: AudioFormat, frame_duration: Duration) -> Self {
        let frame_samples = format.samples_for(frame_duration).max(1);
        Self {
            sample_rate: format.sample_rate,
            frame_bytes: frame_samples * BYTES_PER_SAMPLE,
            remainder: Vec::with_capacity(frame_samples * BYTES_PER_SAMPLE),
            emitted_samples: 0,
        }
    }

    /// Bytes in one full frame
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Bytes carried over waiting for more input
    pub fn remainder_len(&self) -> usize {
        self.remainder.len()
    }

    /// Append bytes and return every frame that is now complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<AudioFrame> {
        self.remainder.extend_from_slice(bytes);

        let whole = self.remainder.len() / self.frame_bytes;
        if whole == 0 {
            return Vec::new();
        }

        let consumed = whole * self.frame_bytes;
        let blocks: Vec<Vec<i16>> = self.remainder[..consumed]
            .chunks_exact(self.frame_bytes)
            .map(bytes_to_samples)
            .collect();

        self.remainder.drain(..consumed);
        blocks.into_iter().map(|samples| self.make_frame(samples)).collect()
    }

    /// Emit the carried whole samples as a short frame
    ///
    /// A dangling half sample stays in the remainder.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        let whole_bytes = self.remainder.len() - self.remainder.len() % BYTES_PER_SAMPLE;
        if whole_bytes == 0 {
            return None;
        }

        let samples = bytes_to_samples(&self.remainder[..whole_bytes]);
        self.remainder.drain(..whole_bytes);
        Some(self.make_frame(samples))
    }

    fn make_frame(&mut self, samples: Vec<i16>) -> AudioFrame {
        let timestamp_ms = if self.sample_rate == 0 {
            0
        } else {
            self.emitted_samples * 1000 / self.sample_rate as u64
        };
        self.emitted_samples += samples.len() as u64;
        AudioFrame::new(samples, self.sample_rate, timestamp_ms)
    }
}
