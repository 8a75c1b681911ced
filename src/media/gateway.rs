use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::rtp::RtpPacket;
use super::{AudioSink, AudioSource, DeviceAudio};
use crate::audio::AudioFormat;
use crate::error::Result;
use crate::signaling::{SignalingState, PCM_PAYLOAD_TYPE};

const MAX_DATAGRAM: usize = 1500;

/// Local UDP endpoint carrying the negotiated audio track
pub struct RtpEndpoint {
    socket: Arc<UdpSocket>,
    ssrc: u32,
}

impl RtpEndpoint {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("RTP endpoint bound on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            ssrc: rand::random(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Source and sink halves, both gated on the signaling state
    pub fn split(
        self,
        format: AudioFormat,
        state: watch::Receiver<SignalingState>,
        remote: watch::Receiver<Option<SocketAddr>>,
    ) -> (GatewaySource, GatewaySink) {
        let source = GatewaySource {
            socket: self.socket.clone(),
            state: state.clone(),
            format,
            buf: vec![0u8; MAX_DATAGRAM],
        };
        let sink = GatewaySink {
            socket: self.socket,
            state,
            remote,
            ssrc: self.ssrc,
            sequence: rand::random(),
            timestamp: rand::random(),
            dropped_frames: 0,
        };
        (source, sink)
    }
}

fn media_finished(state: SignalingState) -> bool {
    matches!(state, SignalingState::Closing | SignalingState::Closed)
}

/// Inbound RTP, delivered only while signaling reads `Connected`
pub struct GatewaySource {
    socket: Arc<UdpSocket>,
    state: watch::Receiver<SignalingState>,
    format: AudioFormat,
    buf: Vec<u8>,
}

#[async_trait]
impl AudioSource for GatewaySource {
    async fn recv(&mut self) -> Result<Option<DeviceAudio>> {
        loop {
            let state = *self.state.borrow_and_update();
            if media_finished(state) {
                return Ok(None);
            }

            tokio::select! {
                changed = self.state.changed() => {
                    if changed.is_err() {
                        return Ok(None);
                    }
                }
                received = self.socket.recv_from(&mut self.buf) => {
                    let (len, from) = received?;
                    if !state.allows_media() {
                        debug!("Dropping {} bytes from {} while {}", len, from, state);
                        continue;
                    }
                    let packet = match RtpPacket::decode(&self.buf[..len]) {
                        Ok(packet) => packet,
                        Err(e) => {
                            warn!("Dropping datagram from {}: {}", from, e);
                            continue;
                        }
                    };
                    if packet.payload_type != PCM_PAYLOAD_TYPE {
                        debug!("Ignoring RTP payload type {}", packet.payload_type);
                        continue;
                    }
                    return Ok(Some(DeviceAudio {
                        pcm: packet.payload,
                        format: self.format,
                    }));
                }
            }
        }
    }

    fn name(&self) -> &str {
        "gateway"
    }
}

/// Outbound RTP to the negotiated remote endpoint
pub struct GatewaySink {
    socket: Arc<UdpSocket>,
    state: watch::Receiver<SignalingState>,
    remote: watch::Receiver<Option<SocketAddr>>,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    dropped_frames: u64,
}

#[async_trait]
impl AudioSink for GatewaySink {
    async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let state = *self.state.borrow();
        let remote = *self.remote.borrow();

        let remote = match remote {
            Some(remote) if state.allows_media() => remote,
            _ => {
                self.dropped_frames += 1;
                if self.dropped_frames % 50 == 1 {
                    debug!("Holding back outbound media while {} ({} frames)", state, self.dropped_frames);
                }
                return Ok(());
            }
        };

        let packet = RtpPacket::new(PCM_PAYLOAD_TYPE, self.sequence, self.timestamp, self.ssrc, frame.to_vec());
        self.socket.send_to(&packet.encode(), remote).await?;

        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add((frame.len() / 2) as u32);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.dropped_frames > 0 {
            info!("Gateway sink closed, {} frames held back outside Connected", self.dropped_frames);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "gateway"
    }
}
