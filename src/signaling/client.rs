use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::channel::GatewayChannel;
use super::messages::{JanusKind, JanusMessage, JanusRequest, TrickleCandidate};
use super::sdp::{build_offer, host_candidate, IceCandidate, OfferParams, RemoteDescription};
use super::state::{SignalingEvent, SignalingState};
use crate::error::{RelayError, Result};
use crate::session::CancelToken;

/// Gateway negotiation settings
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Plugin to attach to
    pub plugin: String,
    /// Room to join
    pub room: u64,
    /// Display name announced in the room
    pub display: String,
    /// Upper bound for the whole create → answer → ICE sequence
    pub negotiation_timeout: Duration,
    /// Interval between session keepalives
    pub keepalive_interval: Duration,
    /// Optional gateway API secret
    pub api_secret: Option<String>,
    /// Treat a usable remote candidate in the answer as ICE confirmation
    /// instead of waiting for `webrtcup`
    pub assume_ice_on_answer: bool,
    /// Audio parameters advertised in the offer
    pub sample_rate: u32,
    pub ptime_ms: u32,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            plugin: "janus.plugin.audiobridge".to_string(),
            room: 1234,
            display: "voice-relay".to_string(),
            negotiation_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(25),
            api_secret: None,
            assume_ice_on_answer: false,
            sample_rate: 16_000,
            ptime_ms: 20,
        }
    }
}

/// Identifiers of the live gateway session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingSession {
    pub session_id: Option<u64>,
    pub handle_id: Option<u64>,
    pub room_id: u64,
    pub state: SignalingState,
}

/// Outcome of a successful negotiation
#[derive(Debug, Clone)]
pub struct NegotiatedMedia {
    /// Remote RTP endpoint
    pub remote: SocketAddr,
    pub description: RemoteDescription,
}

/// Drives the gateway handshake and owns the control channel
///
/// State changes are published on a watch channel; media adapters only move
/// audio while it reads `Connected`.
pub struct SignalingClient<C: GatewayChannel> {
    channel: C,
    settings: GatewaySettings,
    session: SignalingSession,
    local_rtp: SocketAddr,
    ssrc: u32,
    state_tx: watch::Sender<SignalingState>,
    endpoint_tx: watch::Sender<Option<SocketAddr>>,
    pending: VecDeque<JanusMessage>,
    restarts: u32,
}

impl<C: GatewayChannel> SignalingClient<C> {
    pub fn new(channel: C, settings: GatewaySettings, local_rtp: SocketAddr, ssrc: u32) -> Self {
        let (state_tx, _) = watch::channel(SignalingState::Disconnected);
        let (endpoint_tx, _) = watch::channel(None);
        Self {
            channel,
            session: SignalingSession {
                session_id: None,
                handle_id: None,
                room_id: settings.room,
                state: SignalingState::Disconnected,
            },
            settings,
            local_rtp,
            ssrc,
            state_tx,
            endpoint_tx,
            pending: VecDeque::new(),
            restarts: 0,
        }
    }

    pub fn state(&self) -> SignalingState {
        self.session.state
    }

    pub fn session(&self) -> &SignalingSession {
        &self.session
    }

    /// Follow state changes
    pub fn subscribe(&self) -> watch::Receiver<SignalingState> {
        self.state_tx.subscribe()
    }

    /// Follow the negotiated remote RTP endpoint
    pub fn endpoint(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.endpoint_tx.subscribe()
    }

    fn apply(&mut self, event: SignalingEvent) -> Result<()> {
        let from = self.session.state;
        let to = from.on(event)?;
        if from != to {
            info!("Signaling {} -> {} ({:?})", from, to, event);
        }
        self.session.state = to;
        self.state_tx.send_replace(to);
        Ok(())
    }

    /// Run the full handshake up to `Connected`
    ///
    /// Any failure, including the negotiation timeout, tears the gateway
    /// session down (Closing → Closed) before the error is returned.
    pub async fn negotiate(&mut self) -> Result<NegotiatedMedia> {
        self.apply(SignalingEvent::Connect)?;
        self.negotiate_from_connecting().await
    }

    async fn negotiate_from_connecting(&mut self) -> Result<NegotiatedMedia> {
        let limit = self.settings.negotiation_timeout;
        let outcome = match tokio::time::timeout(limit, self.handshake()).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::NegotiationTimeout(limit)),
        };

        match outcome {
            Ok(media) => Ok(media),
            Err(e) => {
                error!("Gateway negotiation failed: {}", e);
                self.abort().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<NegotiatedMedia> {
        let secret = self.settings.api_secret.clone();

        let created = self
            .request(JanusRequest::create().with_secret(secret.as_deref()))
            .await?;
        let session_id = created
            .data
            .map(|d| d.id)
            .ok_or_else(|| RelayError::Protocol("create response without session id".into()))?;
        self.session.session_id = Some(session_id);
        self.apply(SignalingEvent::SessionAck)?;

        let attached = self
            .request(JanusRequest::attach(session_id, &self.settings.plugin).with_secret(secret.as_deref()))
            .await?;
        let handle_id = attached
            .data
            .map(|d| d.id)
            .ok_or_else(|| RelayError::Protocol("attach response without handle id".into()))?;
        self.session.handle_id = Some(handle_id);
        self.apply(SignalingEvent::HandleAck)?;

        let joined = self
            .request(
                JanusRequest::join(session_id, handle_id, self.settings.room, &self.settings.display)
                    .with_secret(secret.as_deref()),
            )
            .await?;
        if joined.plugin_event("audiobridge") != Some("joined") {
            return Err(RelayError::Protocol(format!(
                "room {} join not confirmed: {:?}",
                self.settings.room,
                joined.plugindata.map(|p| p.data)
            )));
        }
        self.apply(SignalingEvent::JoinAck)?;

        let offer = build_offer(&OfferParams {
            rtp_addr: self.local_rtp,
            ssrc: self.ssrc,
            sample_rate: self.settings.sample_rate,
            ptime_ms: self.settings.ptime_ms,
            session_version: chrono::Utc::now().timestamp() as u64,
        });
        let configure = JanusRequest::configure_offer(session_id, handle_id, offer).with_secret(secret.as_deref());
        let transaction = configure.transaction.clone();
        self.channel.send(&configure).await?;
        self.apply(SignalingEvent::OfferSent)?;

        self.trickle_local_candidates(session_id, handle_id).await?;

        let answer = self.await_transaction(&transaction).await?;
        let jsep = answer
            .jsep
            .filter(|j| j.is_answer())
            .ok_or_else(|| RelayError::Protocol("configure event carried no SDP answer".into()))?;
        let mut description = RemoteDescription::parse(&jsep.sdp)?;
        if !description.accepts_pcm() {
            warn!("Answer does not list the PCM payload type: {:?}", description.payload_types);
        }

        self.await_ice(&mut description).await?;

        let remote = description
            .rtp_endpoint()
            .ok_or_else(|| RelayError::IceFailed("no usable remote RTP endpoint".into()))?;

        self.apply(SignalingEvent::MediaUp)?;
        self.endpoint_tx.send_replace(Some(remote));
        info!(
            "Gateway media connected: session={} handle={} room={} remote={}",
            session_id, handle_id, self.settings.room, remote
        );

        Ok(NegotiatedMedia { remote, description })
    }

    async fn trickle_local_candidates(&mut self, session_id: u64, handle_id: u64) -> Result<()> {
        let candidate = TrickleCandidate::Candidate {
            candidate: host_candidate(self.local_rtp),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        };
        let secret = self.settings.api_secret.clone();
        self.channel
            .send(&JanusRequest::trickle(session_id, handle_id, candidate).with_secret(secret.as_deref()))
            .await?;
        self.channel
            .send(
                &JanusRequest::trickle(session_id, handle_id, TrickleCandidate::completed())
                    .with_secret(secret.as_deref()),
            )
            .await
    }

    /// Event addressed to a handle other than the live one (e.g. the
    /// `detached` that follows releasing the old handle on restart)
    fn is_stale(&self, message: &JanusMessage) -> bool {
        match (message.sender, self.session.handle_id) {
            (Some(sender), Some(handle)) => sender != handle,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Wait for ICE confirmation, folding trickled remote candidates in
    async fn await_ice(&mut self, description: &mut RemoteDescription) -> Result<()> {
        loop {
            if self.settings.assume_ice_on_answer && description.rtp_endpoint().is_some() {
                return Ok(());
            }

            let message = self.next_message().await?;
            match message.kind() {
                JanusKind::WebrtcUp => return Ok(()),
                JanusKind::Trickle => {
                    if let Some(TrickleCandidate::Candidate { candidate, .. }) = &message.candidate {
                        if let Some(parsed) = IceCandidate::parse(candidate) {
                            debug!("Remote candidate trickled: {}", parsed.addr);
                            description.candidates.push(parsed);
                        }
                    }
                }
                JanusKind::Hangup if !self.is_stale(&message) => {
                    return Err(RelayError::IceFailed(
                        message.reason.unwrap_or_else(|| "hangup during negotiation".into()),
                    ))
                }
                JanusKind::Error => return Err(gateway_error(&message)),
                other => debug!("Ignoring {:?} while waiting for ICE", other),
            }
        }
    }

    /// Send a request and wait for its final response (acks are skipped)
    async fn request(&mut self, request: JanusRequest) -> Result<JanusMessage> {
        let transaction = request.transaction.clone();
        self.channel.send(&request).await?;
        self.await_transaction(&transaction).await
    }

    async fn await_transaction(&mut self, transaction: &str) -> Result<JanusMessage> {
        loop {
            let message = match self.channel.recv().await? {
                Some(message) => message,
                None => return Err(RelayError::Transport("gateway closed the control channel".into())),
            };

            if !message.is_for(transaction) {
                self.pending.push_back(message);
                continue;
            }

            match message.kind() {
                JanusKind::Ack => continue,
                JanusKind::Error => return Err(gateway_error(&message)),
                JanusKind::Success | JanusKind::Event => {
                    if let Some((code, reason)) = message.plugin_error() {
                        return Err(RelayError::Gateway { code, reason });
                    }
                    return Ok(message);
                }
                other => {
                    return Err(RelayError::Protocol(format!(
                        "unexpected {:?} for transaction {}",
                        other, transaction
                    )))
                }
            }
        }
    }

    async fn next_message(&mut self) -> Result<JanusMessage> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }
        self.channel
            .recv()
            .await?
            .ok_or_else(|| RelayError::Transport("gateway closed the control channel".into()))
    }

    /// Keep the gateway session alive and watch for connectivity loss
    ///
    /// The first ICE loss after `Connected` triggers one full renegotiation;
    /// a second loss is fatal. Returns `Ok` when cancelled.
    pub async fn supervise(&mut self, cancel: CancelToken) -> Result<()> {
        let mut keepalive = tokio::time::interval(self.settings.keepalive_interval);
        keepalive.tick().await;

        loop {
            let message = if let Some(message) = self.pending.pop_front() {
                message
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = keepalive.tick() => {
                        if let Some(session_id) = self.session.session_id {
                            let request = JanusRequest::keepalive(session_id)
                                .with_secret(self.settings.api_secret.as_deref());
                            self.channel.send(&request).await?;
                        }
                        continue;
                    }
                    message = self.channel.recv() => match message? {
                        Some(message) => message,
                        None => return Err(RelayError::Transport("gateway closed the control channel".into())),
                    },
                }
            };

            if self.is_stale(&message) {
                debug!("Ignoring {} for released handle {:?}", message.janus, message.sender);
                continue;
            }

            match message.kind() {
                JanusKind::Hangup | JanusKind::Detached => {
                    let reason = message.reason.clone().unwrap_or_else(|| message.janus.clone());
                    self.on_ice_lost(reason).await?;
                }
                JanusKind::Media if message.receiving == Some(false) => {
                    warn!("Gateway reports media no longer being received");
                }
                JanusKind::SlowLink => warn!("Gateway reports a slow link"),
                JanusKind::Timeout => {
                    return Err(RelayError::Protocol("gateway session timed out".into()));
                }
                JanusKind::Error => return Err(gateway_error(&message)),
                JanusKind::Event => {
                    if let Some((code, reason)) = message.plugin_error() {
                        return Err(RelayError::Gateway { code, reason });
                    }
                    debug!("Gateway event: {:?}", message.plugindata);
                }
                other => debug!("Gateway message {:?}", other),
            }
        }
    }

    async fn on_ice_lost(&mut self, reason: String) -> Result<()> {
        if self.session.state != SignalingState::Connected {
            return Ok(());
        }

        if self.restarts > 0 {
            error!("Connectivity lost again after restart: {}", reason);
            self.abort().await;
            return Err(RelayError::IceFailed(reason));
        }

        self.restarts += 1;
        warn!("Connectivity lost ({}), renegotiating once", reason);

        self.apply(SignalingEvent::Restart)?;
        self.endpoint_tx.send_replace(None);
        self.release_gateway_session().await;
        self.pending.clear();

        self.negotiate_from_connecting().await.map(|_| ())
    }

    /// Explicit teardown; idempotent once closed
    pub async fn close(&mut self) -> Result<()> {
        if self.session.state.is_terminal() {
            return Ok(());
        }
        self.apply(SignalingEvent::Close)?;
        self.endpoint_tx.send_replace(None);
        self.release_gateway_session().await;
        if let Err(e) = self.channel.close().await {
            debug!("Control channel close: {}", e);
        }
        self.apply(SignalingEvent::Closed)
    }

    async fn abort(&mut self) {
        if self.session.state.is_terminal() {
            return;
        }
        if let Err(e) = self.apply(SignalingEvent::Fatal) {
            warn!("{}", e);
        }
        self.endpoint_tx.send_replace(None);
        self.release_gateway_session().await;
        if let Err(e) = self.apply(SignalingEvent::Closed) {
            warn!("{}", e);
        }
    }

    /// Best-effort detach/destroy of the current gateway ids
    async fn release_gateway_session(&mut self) {
        let secret = self.settings.api_secret.clone();
        if let (Some(session_id), Some(handle_id)) = (self.session.session_id, self.session.handle_id.take()) {
            let detach = JanusRequest::detach(session_id, handle_id).with_secret(secret.as_deref());
            if let Err(e) = self.channel.send(&detach).await {
                debug!("Detach failed: {}", e);
            }
        }
        if let Some(session_id) = self.session.session_id.take() {
            let destroy = JanusRequest::destroy(session_id).with_secret(secret.as_deref());
            if let Err(e) = self.channel.send(&destroy).await {
                debug!("Destroy failed: {}", e);
            }
        }
    }
}

fn gateway_error(message: &JanusMessage) -> RelayError {
    match &message.error {
        Some(body) => RelayError::Gateway {
            code: body.code,
            reason: body.reason.clone(),
        },
        None => RelayError::Protocol(format!("gateway error without body: {}", message.janus)),
    }
}
