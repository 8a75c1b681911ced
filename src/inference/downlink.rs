use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::client::InferenceClient;
use super::messages::{parse_event, ResponseEvent};
use crate::audio::format::samples_to_bytes;
use crate::audio::{decode_payload, AudioFormat, Normalizer};
use crate::error::{RelayError, Result};
use crate::relay::PlaybackProducer;
use crate::session::{CancelToken, RelayCounters};

/// Incremental event stream of one inference response
#[async_trait]
pub trait ResponseStream: Send {
    /// Start waiting for the next response
    async fn open(&mut self) -> Result<()>;

    /// Next raw event payload, `None` when the remote end closes the stream
    async fn next_event(&mut self) -> Result<Option<String>>;
}

/// Splits a server-sent event byte stream into `data` payloads
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feed raw bytes, returning every completed event's data
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(data) = Self::event_data(&block[..end]) {
                events.push(data);
            }
        }
        events
    }

    /// Data of a trailing event that was not terminated by a blank line
    pub fn finish(&mut self) -> Option<String> {
        let block = std::mem::take(&mut self.buffer);
        Self::event_data(&block)
    }

    fn event_data(block: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(block);
        let lines: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| data.strip_prefix(' ').unwrap_or(data))
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// `POST /api/v1/completions` read as server-sent events
pub struct SseResponseStream {
    client: InferenceClient,
    response: Option<reqwest::Response>,
    parser: SseParser,
    ready: VecDeque<String>,
}

impl SseResponseStream {
    pub fn new(client: InferenceClient) -> Self {
        Self {
            client,
            response: None,
            parser: SseParser::default(),
            ready: VecDeque::new(),
        }
    }
}

#[async_trait]
impl ResponseStream for SseResponseStream {
    async fn open(&mut self) -> Result<()> {
        self.parser = SseParser::default();
        self.ready.clear();
        self.response = Some(self.client.open_completions().await?);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(Some(event));
            }

            let Some(response) = self.response.as_mut() else {
                return Ok(None);
            };

            match response.chunk().await? {
                Some(bytes) => self.ready.extend(self.parser.push(&bytes)),
                None => {
                    self.response = None;
                    self.ready.extend(self.parser.finish());
                }
            }
        }
    }
}

/// Routes response events to the device text path and the playback queue
pub struct DownlinkReceiver {
    stream: Box<dyn ResponseStream>,
    text_tx: mpsc::Sender<String>,
    playback: PlaybackProducer,
    normalizer: Normalizer,
    counters: Arc<RelayCounters>,
    reopen_delay: Duration,
}

impl DownlinkReceiver {
    pub fn new(
        stream: Box<dyn ResponseStream>,
        text_tx: mpsc::Sender<String>,
        playback: PlaybackProducer,
        counters: Arc<RelayCounters>,
        reopen_delay: Duration,
    ) -> Self {
        Self {
            stream,
            text_tx,
            playback,
            normalizer: Normalizer::new(AudioFormat::default()),
            counters,
            reopen_delay,
        }
    }

    /// Consume responses until cancelled
    ///
    /// Each response is one stream; it is reopened after it ends. A stream
    /// that closes before delivering anything is reported and retried.
    pub async fn run(mut self, cancel: CancelToken) -> Result<()> {
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                outcome = self.receive_response() => outcome,
            };

            match outcome {
                Ok(0) => {
                    let e = RelayError::Inference("response stream closed before any event".into());
                    error!("{}", e);
                }
                Ok(events) => debug!("Response complete after {} events", events),
                Err(RelayError::Cancelled) => return Ok(()),
                Err(e) if !e.is_fatal() => warn!("{}", e),
                Err(RelayError::Transport(reason)) => {
                    warn!("Response stream dropped: {}", reason);
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.reopen_delay) => {}
            }
        }
    }

    /// Receive one response; returns the number of payloads seen
    pub async fn receive_response(&mut self) -> Result<usize> {
        self.stream.open().await?;

        let mut payloads = 0;
        while let Some(payload) = self.stream.next_event().await? {
            payloads += 1;
            if self.handle_payload(&payload).await? {
                info!("Response finished");
                break;
            }
        }
        Ok(payloads)
    }

    /// Route one raw payload; returns whether it closed the response
    async fn handle_payload(&mut self, payload: &str) -> Result<bool> {
        let parsed = match parse_event(payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Skipping response event: {}", e);
                RelayCounters::incr(&self.counters.events_dropped);
                return Ok(false);
            }
        };

        for event in parsed.events {
            match event {
                ResponseEvent::Text(text) => {
                    debug!("Text reply: {}", text);
                    self.text_tx.send(text).await.map_err(|_| RelayError::Cancelled)?;
                    RelayCounters::incr(&self.counters.text_events);
                }
                ResponseEvent::AudioPayload { bytes, sequence } => {
                    let pcm = match self.decode_audio(&bytes) {
                        Ok(pcm) => pcm,
                        Err(e) => {
                            warn!("Skipping audio payload {:?}: {}", sequence, e);
                            RelayCounters::incr(&self.counters.events_dropped);
                            continue;
                        }
                    };
                    self.playback.push(pcm).await?;
                    RelayCounters::incr(&self.counters.audio_payloads);
                }
            }
        }

        Ok(parsed.end_of_response)
    }

    /// WAV or raw PCM to canonical 16 kHz mono bytes
    fn decode_audio(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let target = self.normalizer.target();
        let decoded = decode_payload(bytes, target)?;
        let pcm = samples_to_bytes(&decoded.samples);
        if decoded.format == target {
            Ok(pcm)
        } else {
            self.normalizer.normalize_clip(&pcm, decoded.format)
        }
    }
}
