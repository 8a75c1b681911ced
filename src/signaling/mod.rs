pub mod channel;
pub mod client;
pub mod messages;
pub mod sdp;
pub mod state;

pub use channel::{GatewayChannel, WsGatewayChannel};
pub use client::{GatewaySettings, NegotiatedMedia, SignalingClient, SignalingSession};
pub use messages::{JanusKind, JanusMessage, JanusRequest, Jsep, TrickleCandidate};
pub use sdp::{build_offer, IceCandidate, OfferParams, RemoteDescription, PCM_PAYLOAD_TYPE};
pub use state::{SignalingEvent, SignalingState};
