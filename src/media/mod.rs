//! Device-facing media transports
//!
//! A session picks one source/sink pair when it starts:
//! - `duplex`: raw PCM over the device WebSocket (simple mode)
//! - `gateway`: RTP over UDP negotiated through the Janus gateway
//! - `channel`: in-process mpsc pair, used for embedding and tests

pub mod channel;
pub mod duplex;
pub mod gateway;
pub mod rtp;

use async_trait::async_trait;
use tracing::debug;

use crate::audio::AudioFormat;
use crate::error::Result;

pub use channel::{ChannelSink, ChannelSource, SinkItem};
pub use duplex::{DuplexSink, DuplexSource};
pub use gateway::{GatewaySink, GatewaySource, RtpEndpoint};
pub use rtp::RtpPacket;

/// One unit of audio as delivered by the device transport
#[derive(Debug, Clone)]
pub struct DeviceAudio {
    /// Interleaved 16-bit little-endian PCM
    pub pcm: Vec<u8>,
    /// Declared input profile
    pub format: AudioFormat,
}

/// Where inbound device audio comes from
#[async_trait]
pub trait AudioSource: Send {
    /// Next payload, `None` once the device has disconnected
    async fn recv(&mut self) -> Result<Option<DeviceAudio>>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// Where outbound frames and replies go
#[async_trait]
pub trait AudioSink: Send {
    /// Deliver one fixed-size PCM frame
    async fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Deliver a text reply; transports without a text path just log it
    async fn send_text(&mut self, text: &str) -> Result<()> {
        debug!("{} has no text path, reply: {}", self.name(), text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()>;

    /// Transport name for logging
    fn name(&self) -> &str;
}
