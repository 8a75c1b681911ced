use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{AudioSink, AudioSource, DeviceAudio};
use crate::audio::AudioFormat;
use crate::error::{RelayError, Result};

/// In-process audio source fed through an mpsc sender
///
/// Dropping the sender ends the stream, which the session treats as a clean
/// device disconnect.
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
    format: AudioFormat,
}

impl ChannelSource {
    pub fn new(format: AudioFormat, capacity: usize) -> (Self, mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { rx, format }, tx)
    }
}

#[async_trait]
impl AudioSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<DeviceAudio>> {
        Ok(self.rx.recv().await.map(|pcm| DeviceAudio {
            pcm,
            format: self.format,
        }))
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// What a `ChannelSink` delivered, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkItem {
    Frame(Vec<u8>),
    Text(String),
}

/// In-process audio sink draining into an mpsc receiver
pub struct ChannelSink {
    tx: Option<mpsc::Sender<SinkItem>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SinkItem>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    async fn deliver(&mut self, item: SinkItem) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| RelayError::Transport("channel sink closed".into()))?;
        tx.send(item)
            .await
            .map_err(|_| RelayError::Transport("channel sink receiver dropped".into()))
    }
}

#[async_trait]
impl AudioSink for ChannelSink {
    async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.deliver(SinkItem::Frame(frame.to_vec())).await
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.deliver(SinkItem::Text(text.to_string())).await
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "channel"
    }
}
