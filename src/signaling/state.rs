use std::fmt;

use crate::error::{RelayError, Result};

/// Gateway negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalingState {
    Disconnected,
    Connecting,
    SessionCreated,
    HandleAttached,
    RoomJoined,
    NegotiatingMedia,
    Connected,
    Closing,
    Closed,
}

/// Inputs that drive the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingEvent {
    /// Control channel open, `create` about to be sent
    Connect,
    /// `create` acknowledged with a session id
    SessionAck,
    /// `attach` acknowledged with a handle id
    HandleAck,
    /// Room join confirmed by the plugin
    JoinAck,
    /// Local offer generated and sent
    OfferSent,
    /// Remote answer applied and ICE confirmed
    MediaUp,
    /// ICE lost after `Connected`, full renegotiation begins
    Restart,
    /// Explicit teardown request
    Close,
    /// Unrecoverable negotiation error
    Fatal,
    /// Teardown finished
    Closed,
}

impl SignalingState {
    /// Apply `event`, rejecting anything outside the transition table
    pub fn on(self, event: SignalingEvent) -> Result<SignalingState> {
        use SignalingEvent as E;
        use SignalingState as S;

        let next = match (self, event) {
            (S::Disconnected, E::Connect) => S::Connecting,
            (S::Connecting, E::SessionAck) => S::SessionCreated,
            (S::SessionCreated, E::HandleAck) => S::HandleAttached,
            (S::HandleAttached, E::JoinAck) => S::RoomJoined,
            (S::RoomJoined, E::OfferSent) => S::NegotiatingMedia,
            (S::NegotiatingMedia, E::MediaUp) => S::Connected,
            (S::Connected, E::Restart) => S::Connecting,
            (S::Closing, E::Closed) => S::Closed,
            (S::Closing, E::Close | E::Fatal) => S::Closing,
            (S::Closed, _) => {
                return Err(RelayError::Protocol(format!(
                    "signaling session is closed, cannot apply {:?}",
                    event
                )))
            }
            (_, E::Close | E::Fatal) => S::Closing,
            (from, event) => {
                return Err(RelayError::Protocol(format!(
                    "invalid signaling transition {} --{:?}-->",
                    from, event
                )))
            }
        };

        Ok(next)
    }

    pub fn is_terminal(self) -> bool {
        self == SignalingState::Closed
    }

    /// Only a connected channel may carry media
    pub fn allows_media(self) -> bool {
        self == SignalingState::Connected
    }
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalingState::Disconnected => "disconnected",
            SignalingState::Connecting => "connecting",
            SignalingState::SessionCreated => "session-created",
            SignalingState::HandleAttached => "handle-attached",
            SignalingState::RoomJoined => "room-joined",
            SignalingState::NegotiatingMedia => "negotiating-media",
            SignalingState::Connected => "connected",
            SignalingState::Closing => "closing",
            SignalingState::Closed => "closed",
        };
        f.write_str(name)
    }
}
