use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{AudioSink, AudioSource, DeviceAudio};
use crate::audio::AudioFormat;
use crate::error::{RelayError, Result};

/// Split an upgraded device socket into its two media halves
pub fn split(socket: WebSocket, format: AudioFormat) -> (DuplexSource, DuplexSink) {
    let (sink, stream) = socket.split();
    (DuplexSource { stream, format }, DuplexSink { sink })
}

/// Binary PCM messages from the device
pub struct DuplexSource {
    stream: SplitStream<WebSocket>,
    format: AudioFormat,
}

#[async_trait]
impl AudioSource for DuplexSource {
    async fn recv(&mut self) -> Result<Option<DeviceAudio>> {
        while let Some(message) = self.stream.next().await {
            let message = message.map_err(|e| RelayError::Transport(format!("device socket: {}", e)))?;
            match message {
                Message::Binary(pcm) => {
                    return Ok(Some(DeviceAudio {
                        pcm,
                        format: self.format,
                    }))
                }
                Message::Text(text) => {
                    warn!("Ignoring text message from device: {}", text);
                }
                Message::Close(frame) => {
                    info!("Device closed the socket: {:?}", frame);
                    return Ok(None);
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        Ok(None)
    }

    fn name(&self) -> &str {
        "duplex"
    }
}

/// Binary PCM frames and JSON text replies to the device
pub struct DuplexSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl AudioSink for DuplexSink {
    async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.sink
            .send(Message::Binary(frame.to_vec()))
            .await
            .map_err(|e| RelayError::Transport(format!("device socket: {}", e)))
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        let payload = json!({ "type": "text", "content": text }).to_string();
        self.sink
            .send(Message::Text(payload))
            .await
            .map_err(|e| RelayError::Transport(format!("device socket: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.sink.close().await {
            debug!("Device socket already closed: {}", e);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "duplex"
    }
}
