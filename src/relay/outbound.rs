use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::playback::PlaybackConsumer;
use crate::audio::AudioFormat;
use crate::media::AudioSink;
use crate::session::{CancelToken, RelayCounters};

/// Paces playback to the device at a fixed frame cadence
///
/// Every tick produces exactly one frame of `frame_bytes`: queued audio when
/// there is any, silence otherwise.
pub struct OutboundTrackAdapter {
    sink: Box<dyn AudioSink>,
    playback: PlaybackConsumer,
    text_rx: mpsc::Receiver<String>,
    frame_duration: Duration,
    frame_bytes: usize,
    /// Unsent tail of the payload currently being played
    pending: Vec<u8>,
    counters: Arc<RelayCounters>,
}

impl OutboundTrackAdapter {
    pub fn new(
        sink: Box<dyn AudioSink>,
        playback: PlaybackConsumer,
        text_rx: mpsc::Receiver<String>,
        frame_duration: Duration,
        counters: Arc<RelayCounters>,
    ) -> Self {
        let frame_bytes = AudioFormat::default().bytes_for(frame_duration).max(2);
        Self {
            sink,
            playback,
            text_rx,
            frame_duration,
            frame_bytes,
            pending: Vec::new(),
            counters,
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Assemble the frame for the current tick
    ///
    /// Payloads are split across frames; the tail is zero-padded only when
    /// nothing else is queued.
    pub fn next_frame(&mut self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.frame_bytes);

        loop {
            let take = (self.frame_bytes - frame.len()).min(self.pending.len());
            frame.extend(self.pending.drain(..take));
            if frame.len() == self.frame_bytes {
                break;
            }
            match self.playback.try_pop() {
                Some(payload) => self.pending = payload,
                None => break,
            }
        }

        if frame.is_empty() {
            RelayCounters::incr(&self.counters.silence_frames);
        }
        frame.resize(self.frame_bytes, 0);
        RelayCounters::incr(&self.counters.frames_out);
        frame
    }

    /// Emit frames until cancelled
    ///
    /// A failing sink means the device is gone; the adapter stops emitting
    /// and leaves the session end to the inbound side.
    pub async fn run(mut self, cancel: CancelToken) -> crate::error::Result<()> {
        let mut ticker = tokio::time::interval(self.frame_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut text_open = true;

        info!(
            "Outbound adapter writing {}-byte frames every {}ms to {}",
            self.frame_bytes,
            self.frame_duration.as_millis(),
            self.sink.name()
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                text = self.text_rx.recv(), if text_open => match text {
                    Some(text) => {
                        if let Err(e) = self.sink.send_text(&text).await {
                            warn!("Text delivery to {} failed: {}", self.sink.name(), e);
                            break;
                        }
                    }
                    None => text_open = false,
                },
                _ = ticker.tick() => {
                    let frame = self.next_frame();
                    if let Err(e) = self.sink.send_frame(&frame).await {
                        warn!("Frame delivery to {} failed: {}", self.sink.name(), e);
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.sink.close().await {
            debug!("Sink close: {}", e);
        }
        Ok(())
    }
}
