use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Canonical relay sample rate (Hz)
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Bytes per 16-bit PCM sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Default device-transport frame duration
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(20);

/// Default upload chunk duration
pub const DEFAULT_CHUNK_DURATION: Duration = Duration::from_secs(1);

/// PCM profile used inside the relay (16-bit, mono)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono)
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: CANONICAL_SAMPLE_RATE,
            channels: 1,
        }
    }
}

impl AudioFormat {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }

    /// Bytes in one interleaved sample group (one sample per channel)
    pub fn block_align(&self) -> usize {
        BYTES_PER_SAMPLE * self.channels.max(1) as usize
    }

    /// Sample groups spanning `duration`
    pub fn samples_for(&self, duration: Duration) -> usize {
        (self.sample_rate as u128 * duration.as_micros() / 1_000_000) as usize
    }

    /// Bytes spanning `duration`
    pub fn bytes_for(&self, duration: Duration) -> usize {
        self.samples_for(duration) * self.block_align()
    }

    /// Playback duration of `samples` sample groups
    pub fn duration_of(&self, samples: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(samples as u64 * 1_000_000 / self.sample_rate as u64)
    }
}

/// Little-endian i16 samples to bytes
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Little-endian bytes to i16 samples; a trailing odd byte is ignored
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}
