use std::io::Cursor;

use super::format::{bytes_to_samples, AudioFormat};
use crate::error::{RelayError, Result};

/// Wrap mono/interleaved 16-bit samples in an in-memory WAV container
pub fn encode_wav(samples: &[i16], format: AudioFormat) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        let mut i16_writer = writer.get_i16_writer(samples.len() as u32);
        for &sample in samples {
            i16_writer.write_sample(sample);
        }
        i16_writer.flush()?;
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Decoded audio payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub format: AudioFormat,
}

/// Decode a 16-bit integer WAV container
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(RelayError::Data(format!(
            "unsupported WAV sample format: {} bits {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(DecodedAudio {
        samples,
        format: AudioFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        },
    })
}

/// Whether a payload starts with a RIFF/WAVE header
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode a response payload that is either a WAV container or raw PCM
///
/// Raw PCM is assumed to be in `raw_format`; an odd trailing byte is
/// rejected as corrupt.
pub fn decode_payload(bytes: &[u8], raw_format: AudioFormat) -> Result<DecodedAudio> {
    if is_wav(bytes) {
        return decode_wav(bytes);
    }

    if bytes.len() % raw_format.block_align() != 0 {
        return Err(RelayError::Data(format!(
            "raw PCM payload of {} bytes is not sample aligned",
            bytes.len()
        )));
    }

    Ok(DecodedAudio {
        samples: bytes_to_samples(bytes),
        format: raw_format,
    })
}
