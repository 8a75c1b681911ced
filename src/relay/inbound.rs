use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::{AudioFormat, AudioFrame, AudioFramer, Normalizer};
use crate::error::Result;
use crate::media::AudioSource;
use crate::session::{CancelToken, RelayCounters};

/// Turns device audio into canonical fixed-size frames
pub struct InboundTrackAdapter {
    source: Box<dyn AudioSource>,
    normalizer: Normalizer,
    framer: AudioFramer,
    frames_tx: mpsc::Sender<AudioFrame>,
    counters: Arc<RelayCounters>,
}

impl InboundTrackAdapter {
    pub fn new(
        source: Box<dyn AudioSource>,
        frame_duration: Duration,
        frames_tx: mpsc::Sender<AudioFrame>,
        counters: Arc<RelayCounters>,
    ) -> Self {
        let canonical = AudioFormat::default();
        Self {
            source,
            normalizer: Normalizer::new(canonical),
            framer: AudioFramer::new(canonical, frame_duration),
            frames_tx,
            counters,
        }
    }

    /// Pump the source until it ends or the session is cancelled
    ///
    /// On a clean end of input the framer remainder is flushed and the frame
    /// channel is closed, which lets the accumulator emit its final chunk.
    pub async fn run(mut self, cancel: CancelToken) -> Result<()> {
        info!("Inbound adapter reading from {}", self.source.name());

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                received = self.source.recv() => received?,
            };

            let Some(audio) = received else { break };
            RelayCounters::add(&self.counters.bytes_in, audio.pcm.len() as u64);

            let pcm = match self.normalizer.normalize(&audio.pcm, audio.format) {
                Ok(pcm) => pcm,
                Err(e) => {
                    warn!("Dropping device payload: {}", e);
                    RelayCounters::incr(&self.counters.payloads_dropped);
                    continue;
                }
            };

            for frame in self.framer.push(&pcm) {
                if !forward(&self.frames_tx, &self.counters, frame, &cancel).await {
                    return Ok(());
                }
            }
        }

        info!("{} source ended", self.source.name());
        if let Some(frame) = self.framer.flush() {
            debug!("Flushing short frame of {} samples", frame.sample_count());
            forward(&self.frames_tx, &self.counters, frame, &cancel).await;
        }
        if self.framer.remainder_len() > 0 {
            warn!("Discarding {} byte(s) of incomplete sample at end of input", self.framer.remainder_len());
        }
        Ok(())
    }
}

async fn forward(
    frames_tx: &mpsc::Sender<AudioFrame>,
    counters: &RelayCounters,
    frame: AudioFrame,
    cancel: &CancelToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = frames_tx.send(frame) => {
            if sent.is_err() {
                debug!("Frame receiver dropped");
                return false;
            }
            RelayCounters::incr(&counters.frames_in);
            true
        }
    }
}
