use std::time::Duration;

use super::format::{samples_to_bytes, BYTES_PER_SAMPLE};

/// Fixed-duration slice of mono 16-bit PCM
///
/// Produced by the framer and moved (never shared) down the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Mono PCM samples
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Offset of the first sample since the stream started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, timestamp_ms: u64) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp_ms,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn byte_len(&self) -> usize {
        self.samples.len() * BYTES_PER_SAMPLE
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / self.sample_rate as u64)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        samples_to_bytes(&self.samples)
    }
}
