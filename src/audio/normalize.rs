//! Inbound PCM normalization
//!
//! Device audio may arrive as interleaved multi-channel PCM at an arbitrary
//! rate. Everything past the inbound adapter is mono at the canonical rate.

use super::format::{bytes_to_samples, samples_to_bytes, AudioFormat};
use crate::error::{RelayError, Result};

/// Decode interleaved little-endian PCM, rejecting partial sample groups
pub fn decode_pcm(bytes: &[u8], format: AudioFormat) -> Result<Vec<i16>> {
    let align = format.block_align();
    if bytes.len() % align != 0 {
        return Err(RelayError::Data(format!(
            "{} bytes is not a multiple of the {}-byte sample group",
            bytes.len(),
            align
        )));
    }
    Ok(bytes_to_samples(bytes))
}

/// Down-mix interleaved samples to mono by averaging each sample group
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|group| {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Resample mono audio by linear interpolation
///
/// Output sample `i` maps to source position `i * from / to`. The mapping
/// depends only on the input, so identical input gives identical output.
pub fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            // Fixed-point source position keeps the mapping exact across platforms
            let pos_num = i as u64 * from_rate as u64;
            let idx = (pos_num / to_rate as u64) as usize;
            let frac = pos_num % to_rate as u64;

            let a = samples[idx.min(last)] as i64;
            let b = samples[(idx + 1).min(last)] as i64;
            let value = a + (b - a) * frac as i64 / to_rate as i64;
            value.clamp(i16::MIN as i64, i16::MAX as i64) as i16
        })
        .collect()
}

/// Linear resampler that keeps its position across calls
///
/// Output sample `k` sits at source position `k * from / to` counted from
/// the first sample ever pushed, so splitting the input into payloads does
/// not change the output. A sample is emitted once both of its neighbours
/// have arrived.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    from_rate: u64,
    to_rate: u64,
    /// Source samples still needed, starting at absolute index `base`
    pending: Vec<i16>,
    base: u64,
    /// Index of the next output sample
    next_out: u64,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate: from_rate.max(1) as u64,
            to_rate: to_rate.max(1) as u64,
            pending: Vec::new(),
            base: 0,
            next_out: 0,
        }
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate as u32
    }

    /// Push source samples, returning every output sample now computable
    pub fn process(&mut self, samples: &[i16]) -> Vec<i16> {
        if self.from_rate == self.to_rate {
            return samples.to_vec();
        }
        self.pending.extend_from_slice(samples);

        let mut out = Vec::with_capacity((samples.len() as u64 * self.to_rate / self.from_rate + 1) as usize);
        loop {
            let pos_num = self.next_out * self.from_rate;
            let idx = (pos_num / self.to_rate - self.base) as usize;
            let frac = pos_num % self.to_rate;

            let value = if frac == 0 {
                match self.pending.get(idx) {
                    Some(&a) => a,
                    None => break,
                }
            } else {
                match (self.pending.get(idx), self.pending.get(idx + 1)) {
                    (Some(&a), Some(&b)) => {
                        let (a, b) = (a as i64, b as i64);
                        let value = a + (b - a) * frac as i64 / self.to_rate as i64;
                        value.clamp(i16::MIN as i64, i16::MAX as i64) as i16
                    }
                    _ => break,
                }
            };
            out.push(value);
            self.next_out += 1;
        }

        let needed = self.next_out * self.from_rate / self.to_rate;
        let consumed = ((needed - self.base) as usize).min(self.pending.len());
        self.pending.drain(..consumed);
        self.base += consumed as u64;
        out
    }
}

/// Converts device PCM in `source` format into canonical mono PCM bytes
///
/// `normalize` treats successive payloads as one stream; `normalize_clip`
/// handles a self-contained clip.
#[derive(Debug, Clone)]
pub struct Normalizer {
    target: AudioFormat,
    resampler: Option<StreamResampler>,
}

impl Normalizer {
    pub fn new(target: AudioFormat) -> Self {
        Self {
            target,
            resampler: None,
        }
    }

    pub fn target(&self) -> AudioFormat {
        self.target
    }

    /// Normalize the next payload of a device stream
    pub fn normalize(&mut self, bytes: &[u8], source: AudioFormat) -> Result<Vec<u8>> {
        if source == self.target {
            // Canonical input passes through untouched; the framer carries split samples.
            return Ok(bytes.to_vec());
        }

        let samples = decode_pcm(bytes, source)?;
        let mono = downmix_to_mono(&samples, source.channels);
        if source.sample_rate == self.target.sample_rate {
            return Ok(samples_to_bytes(&mono));
        }

        let target_rate = self.target.sample_rate;
        if self.resampler.as_ref().map(StreamResampler::from_rate) != Some(source.sample_rate) {
            self.resampler = None;
        }
        let resampler = self
            .resampler
            .get_or_insert_with(|| StreamResampler::new(source.sample_rate, target_rate));
        Ok(samples_to_bytes(&resampler.process(&mono)))
    }

    /// Normalize one self-contained clip
    pub fn normalize_clip(&self, bytes: &[u8], source: AudioFormat) -> Result<Vec<u8>> {
        if source == self.target {
            return Ok(bytes.to_vec());
        }

        let samples = decode_pcm(bytes, source)?;
        let mono = downmix_to_mono(&samples, source.channels);
        let resampled = resample_linear(&mono, source.sample_rate, self.target.sample_rate);
        Ok(samples_to_bytes(&resampled))
    }
}
