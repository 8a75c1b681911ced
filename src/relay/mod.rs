//! Per-session audio pumps between the device transport and the inference service

pub mod inbound;
pub mod outbound;
pub mod playback;

pub use inbound::InboundTrackAdapter;
pub use outbound::OutboundTrackAdapter;
pub use playback::{playback_queue, PlaybackConsumer, PlaybackProducer};
