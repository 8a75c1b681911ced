use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::context::SessionContext;
use super::stats::SessionStats;
use crate::audio::{AudioFormat, ChunkAccumulator, ChunkConfig};
use crate::error::{RelayError, Result};
use crate::inference::{DownlinkReceiver, EnvelopeStyle, InferenceClient, ResponseStream, UplinkSender, UploadChannel};
use crate::media::{AudioSink, AudioSource};
use crate::relay::{playback_queue, InboundTrackAdapter, OutboundTrackAdapter};
use crate::signaling::{GatewayChannel, SignalingClient};

/// Gateway signaling client as owned by a session
pub type SessionSignaling = SignalingClient<Box<dyn GatewayChannel>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Inbound,
    Accumulate,
    Uplink,
    Downlink,
    Outbound,
    Signaling,
}

/// Owns one device session from start to teardown
///
/// The device transport is chosen by the caller through the source/sink
/// pair; attaching a signaling client switches to gateway mode.
pub struct SessionOrchestrator {
    context: SessionContext,
    source: Box<dyn AudioSource>,
    sink: Box<dyn AudioSink>,
    upload: Box<dyn UploadChannel>,
    responses: Box<dyn ResponseStream>,
    envelope: EnvelopeStyle,
    control: Option<InferenceClient>,
    signaling: Option<SessionSignaling>,
}

impl SessionOrchestrator {
    pub fn new(
        config: SessionConfig,
        source: Box<dyn AudioSource>,
        sink: Box<dyn AudioSink>,
        upload: Box<dyn UploadChannel>,
        responses: Box<dyn ResponseStream>,
    ) -> Self {
        Self {
            context: SessionContext::new(config),
            source,
            sink,
            upload,
            responses,
            envelope: EnvelopeStyle::default(),
            control: None,
            signaling: None,
        }
    }

    pub fn with_envelope(mut self, envelope: EnvelopeStyle) -> Self {
        self.envelope = envelope;
        self
    }

    /// HTTP control plane used for the option push and conversation stop
    pub fn with_control(mut self, client: InferenceClient) -> Self {
        self.control = Some(client);
        self
    }

    /// Gateway mode: media flows only once this client reports `Connected`
    pub fn with_signaling(mut self, client: SessionSignaling) -> Self {
        self.context = self.context.with_signaling(client.subscribe());
        self.signaling = Some(client);
        self
    }

    /// Shared handle for status reporting and external cancellation
    pub fn context(&self) -> SessionContext {
        self.context.clone()
    }

    /// Run the session to completion
    ///
    /// Returns once every task has finished. The first fatal error cancels
    /// the session and is returned after teardown.
    pub async fn run(self) -> Result<SessionStats> {
        let SessionOrchestrator {
            context,
            source,
            sink,
            upload,
            responses,
            envelope,
            control,
            mut signaling,
        } = self;
        let config = context.config.clone();
        let cancel = context.cancel.clone();
        let counters = context.counters.clone();

        info!("Starting relay session: {}", context.id());

        if let Some(control) = &control {
            if let Err(e) = control.stop().await {
                debug!("No conversation to stop: {}", e);
            }
            if let Some(options) = &config.session_options {
                if let Err(e) = control.push_config(options).await {
                    warn!("Session options rejected: {}", e);
                }
            }
        }

        if let Some(client) = signaling.as_mut() {
            if let Err(e) = client.negotiate().await {
                error!("Session {} failed to negotiate media: {}", context.id(), e);
                Self::stop_conversation(control.as_ref()).await;
                return Err(e);
            }
        }

        let (frames_tx, frames_rx) = mpsc::channel(config.channel_capacity);
        let (chunks_tx, chunks_rx) = mpsc::channel(config.channel_capacity);
        let (text_tx, text_rx) = mpsc::channel(config.channel_capacity);
        let (playback_tx, playback_rx) = playback_queue(config.playback_capacity, config.playback_push_timeout);

        let mut tasks: JoinSet<(Task, Result<()>)> = JoinSet::new();

        let inbound = InboundTrackAdapter::new(source, config.frame_duration, frames_tx, counters.clone());
        let token = cancel.clone();
        tasks.spawn(async move { (Task::Inbound, inbound.run(token).await) });

        let mut accumulator = ChunkAccumulator::new(ChunkConfig {
            target_duration: config.chunk_duration,
            sample_rate: AudioFormat::default().sample_rate,
        });
        let token = cancel.clone();
        tasks.spawn(async move {
            let sent = accumulator.accumulate(frames_rx, chunks_tx, token).await;
            debug!("Accumulator produced {} chunks", sent);
            (Task::Accumulate, Ok(()))
        });

        let mut uplink = UplinkSender::new(upload, envelope, counters.clone());
        if let Some(control) = &control {
            uplink = uplink.with_uid(control.settings().uid.clone());
        }
        let token = cancel.clone();
        tasks.spawn(async move { (Task::Uplink, uplink.run(chunks_rx, token).await) });

        let downlink = DownlinkReceiver::new(responses, text_tx, playback_tx, counters.clone(), config.reopen_delay);
        let token = cancel.clone();
        tasks.spawn(async move { (Task::Downlink, downlink.run(token).await) });

        let outbound = OutboundTrackAdapter::new(sink, playback_rx, text_rx, config.frame_duration, counters.clone());
        let token = cancel.clone();
        tasks.spawn(async move { (Task::Outbound, outbound.run(token).await) });

        if let Some(mut client) = signaling {
            let token = cancel.clone();
            tasks.spawn(async move {
                let supervised = client.supervise(token.clone()).await;
                token.cancel();
                if let Err(e) = client.close().await {
                    warn!("Signaling teardown: {}", e);
                }
                (Task::Signaling, supervised)
            });
        }

        let mut failure: Option<RelayError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((task, Ok(()))) => {
                    debug!("{:?} task finished", task);
                    // Uplink drains only after the device went away and the final chunk was sent.
                    if task == Task::Uplink {
                        cancel.cancel();
                    }
                }
                Ok((task, Err(RelayError::Cancelled))) => debug!("{:?} task cancelled", task),
                Ok((task, Err(e))) => {
                    error!("{:?} task failed: {}", task, e);
                    failure.get_or_insert(e);
                    cancel.cancel();
                }
                Err(e) => {
                    error!("Session task panicked: {}", e);
                    failure.get_or_insert(RelayError::Resource(format!("task panicked: {}", e)));
                    cancel.cancel();
                }
            }
        }

        Self::stop_conversation(control.as_ref()).await;

        let stats = context.stats();
        info!(
            "Session {} ended after {:.1}s: {} chunks up, {} frames out ({} silent)",
            stats.session_id, stats.duration_secs, stats.chunks_uploaded, stats.frames_out, stats.silence_frames
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    async fn stop_conversation(control: Option<&InferenceClient>) {
        if let Some(control) = control {
            if let Err(e) = control.stop().await {
                warn!("Failed to stop conversation: {}", e);
            }
        }
    }
}
