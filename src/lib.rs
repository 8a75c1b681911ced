pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod inference;
pub mod media;
pub mod relay;
pub mod session;
pub mod signaling;

pub use audio::{AudioChunk, AudioFormat, AudioFrame, AudioFramer, ChunkAccumulator, ChunkConfig};
pub use config::Config;
pub use error::{RelayError, Result};
pub use http::{create_router, AppState};
pub use inference::{DownlinkReceiver, InferenceClient, ResponseEvent, UplinkSender};
pub use media::{AudioSink, AudioSource, DeviceAudio};
pub use relay::{InboundTrackAdapter, OutboundTrackAdapter};
pub use session::{CancelToken, SessionConfig, SessionContext, SessionOrchestrator, SessionStats};
pub use signaling::{SignalingClient, SignalingState};
