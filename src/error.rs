//! Relay error taxonomy
//!
//! Errors are grouped by how far they are allowed to travel:
//! - data errors (`Data`) and inference hiccups (`Inference`) stay inside
//!   the component that saw them and are only logged
//! - everything else is session-fatal and ends up at the orchestrator

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection drop or write failure on any channel
    #[error("transport error: {0}")]
    Transport(String),

    /// Unexpected or malformed control-plane message
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Error reported by the media gateway itself
    #[error("gateway error {code}: {reason}")]
    Gateway { code: i64, reason: String },

    /// No SDP answer / ICE confirmation within the negotiation window
    #[error("media negotiation timed out after {0:?}")]
    NegotiationTimeout(Duration),

    /// ICE connectivity lost and the single restart did not recover it
    #[error("ICE connectivity failed: {0}")]
    IceFailed(String),

    /// Isolated corrupt unit (audio frame, response event)
    #[error("malformed data: {0}")]
    Data(String),

    /// Inference service returned nothing for an active request
    #[error("inference service failure: {0}")]
    Inference(String),

    /// Bounded queue stayed full past its wait budget
    #[error("resource exhausted: {0}")]
    Resource(String),

    #[error("session cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Whether this error must tear the session down
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RelayError::Data(_) | RelayError::Inference(_))
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RelayError::Transport(err.to_string())
    }
}

impl From<hound::Error> for RelayError {
    fn from(err: hound::Error) -> Self {
        RelayError::Data(err.to_string())
    }
}

impl From<base64::DecodeError> for RelayError {
    fn from(err: base64::DecodeError) -> Self {
        RelayError::Data(err.to_string())
    }
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_and_inference_errors_are_local() {
        assert!(!RelayError::Data("odd length".into()).is_fatal());
        assert!(!RelayError::Inference("empty stream".into()).is_fatal());
    }

    #[test]
    fn test_transport_and_protocol_errors_are_fatal() {
        assert!(RelayError::Transport("reset".into()).is_fatal());
        assert!(RelayError::Protocol("bad ack".into()).is_fatal());
        assert!(RelayError::NegotiationTimeout(Duration::from_secs(10)).is_fatal());
        assert!(RelayError::Resource("playback full".into()).is_fatal());
    }
}
