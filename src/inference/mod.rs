//! Inference service connectivity
//!
//! Audio goes up as one JSON envelope per chunk over a WebSocket; replies
//! come back as server-sent events on the completions endpoint.

pub mod client;
pub mod downlink;
pub mod messages;
pub mod uplink;

pub use client::{InferenceClient, InferenceSettings};
pub use downlink::{DownlinkReceiver, ResponseStream, SseParser, SseResponseStream};
pub use messages::{parse_event, upload_envelope, EnvelopeStyle, ParsedPayload, ResponseEvent};
pub use uplink::{UplinkSender, UploadChannel, WsUploadChannel};
