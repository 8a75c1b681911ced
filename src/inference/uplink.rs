use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::messages::{upload_envelope, EnvelopeStyle};
use crate::audio::{encode_wav, AudioChunk, AudioFormat};
use crate::error::{RelayError, Result};
use crate::session::{CancelToken, RelayCounters};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Duplex upload channel to the inference service
#[async_trait]
pub trait UploadChannel: Send {
    /// Open (or re-open) the channel
    async fn connect(&mut self) -> Result<()>;

    /// Send one text message
    async fn send(&mut self, text: &str) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// WebSocket upload channel
///
/// A reader task drains the service side of the socket so pings are
/// answered and a close frame is noticed before the next chunk goes out.
pub struct WsUploadChannel {
    url: String,
    writer: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
    open: Arc<AtomicBool>,
}

impl WsUploadChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            writer: None,
            reader: None,
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.open.store(false, Ordering::SeqCst);
        if let Some(mut writer) = self.writer.take() {
            writer.close().await?;
        }
        Ok(())
    }
}

/// Read until the service closes the socket, then mark the channel closed
async fn drain_upstream(mut stream: SplitStream<WsStream>, open: Arc<AtomicBool>) {
    while let Some(message) = stream.next().await {
        match message {
            // Keep reading so the close reply goes out
            Ok(Message::Close(frame)) => {
                info!("Upload channel closed by the service: {:?}", frame);
                open.store(false, Ordering::SeqCst);
            }
            Ok(Message::Text(text)) => debug!("Upload channel message: {}", text),
            Ok(_) => {}
            Err(e) => {
                warn!("Upload channel read failed: {}", e);
                break;
            }
        }
    }
    open.store(false, Ordering::SeqCst);
}

#[async_trait]
impl UploadChannel for WsUploadChannel {
    async fn connect(&mut self) -> Result<()> {
        if let Err(e) = self.shutdown().await {
            debug!("Dropping previous upload connection: {}", e);
        }
        info!("Connecting upload channel to {}", self.url);
        let (stream, _) = connect_async(self.url.as_str()).await?;
        let (writer, reader) = stream.split();

        self.open = Arc::new(AtomicBool::new(true));
        self.reader = Some(tokio::spawn(drain_upstream(reader, self.open.clone())));
        self.writer = Some(writer);
        Ok(())
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| RelayError::Transport("upload channel not connected".into()))?;
        if !self.open.load(Ordering::SeqCst) {
            return Err(RelayError::Transport("upload channel closed by the service".into()));
        }
        writer.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.shutdown().await
    }
}

impl Drop for WsUploadChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Sends chunks to the inference service, one at a time and in order
pub struct UplinkSender {
    channel: Box<dyn UploadChannel>,
    envelope: EnvelopeStyle,
    uid: Option<String>,
    counters: Arc<RelayCounters>,
    connected: bool,
}

impl UplinkSender {
    pub fn new(channel: Box<dyn UploadChannel>, envelope: EnvelopeStyle, counters: Arc<RelayCounters>) -> Self {
        Self {
            channel,
            envelope,
            uid: None,
            counters,
            connected: false,
        }
    }

    /// Conversation identity carried by `messages` envelopes
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Connect if needed, then send
    async fn attempt(&mut self, message: &str) -> Result<()> {
        if !self.connected {
            self.channel.connect().await?;
            self.connected = true;
        }
        let sent = self.channel.send(message).await;
        if sent.is_err() {
            self.connected = false;
        }
        sent
    }

    /// Encode and send one chunk
    ///
    /// A transport failure, on connect or on send, triggers one reconnect
    /// and one resend of the same message; a second failure is returned as
    /// a transport error.
    pub async fn send(&mut self, chunk: &AudioChunk) -> Result<()> {
        let wav = encode_wav(&chunk.samples, AudioFormat::mono(chunk.sample_rate))?;
        let envelope = upload_envelope(self.envelope, &wav, chunk, self.uid.as_deref());
        let message = serde_json::to_string(&envelope)?;

        if let Err(first) = self.attempt(&message).await {
            warn!("Upload of chunk {} failed ({}), reconnecting once", chunk.sequence, first);
            RelayCounters::incr(&self.counters.upload_retries);

            self.connected = false;
            self.channel.connect().await.map_err(|e| {
                RelayError::Transport(format!("upload reconnect failed after '{}': {}", first, e))
            })?;
            self.connected = true;

            self.channel.send(&message).await.map_err(|e| {
                RelayError::Transport(format!("chunk {} resend failed: {}", chunk.sequence, e))
            })?;
        }

        RelayCounters::incr(&self.counters.chunks_uploaded);
        debug!(
            "Uploaded chunk {} ({} bytes wav, final={})",
            chunk.sequence,
            wav.len(),
            chunk.is_final
        );
        Ok(())
    }

    /// Upload every chunk from the channel until it closes or the session is cancelled
    pub async fn run(mut self, mut chunks_rx: mpsc::Receiver<AudioChunk>, cancel: CancelToken) -> Result<()> {
        let result = loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                chunk = chunks_rx.recv() => chunk,
            };
            let Some(chunk) = chunk else {
                info!("Chunk stream ended, uplink done");
                break Ok(());
            };

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                sent = self.send(&chunk) => sent,
            };
            if let Err(e) = sent {
                error!("Uplink failed: {}", e);
                break Err(e);
            }
        };

        if self.connected {
            if let Err(e) = self.channel.close().await {
                debug!("Upload channel close: {}", e);
            }
        }
        result
    }
}
