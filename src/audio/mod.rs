pub mod chunk;
pub mod format;
pub mod frame;
pub mod framer;
pub mod normalize;
pub mod wav;

pub use chunk::{AudioChunk, ChunkAccumulator, ChunkConfig};
pub use format::{AudioFormat, CANONICAL_SAMPLE_RATE, DEFAULT_CHUNK_DURATION, DEFAULT_FRAME_DURATION};
pub use frame::AudioFrame;
pub use framer::AudioFramer;
pub use normalize::{Normalizer, StreamResampler};
pub use wav::{decode_payload, decode_wav, encode_wav, DecodedAudio};
