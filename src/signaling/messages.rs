//! Janus gateway JSON control messages

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// SDP payload carried next to a plugin message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jsep {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

impl Jsep {
    pub fn offer(sdp: String) -> Self {
        Self {
            kind: "offer".to_string(),
            sdp,
        }
    }

    pub fn is_answer(&self) -> bool {
        self.kind == "answer"
    }
}

/// ICE candidate as trickled to / from the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrickleCandidate {
    Candidate {
        candidate: String,
        #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
        sdp_mline_index: Option<u32>,
    },
    Completed {
        completed: bool,
    },
}

impl TrickleCandidate {
    pub fn completed() -> Self {
        TrickleCandidate::Completed { completed: true }
    }
}

/// Outgoing request
#[derive(Debug, Clone, Serialize)]
pub struct JanusRequest {
    pub janus: String,
    pub transaction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsep: Option<Jsep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<TrickleCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apisecret: Option<String>,
}

impl JanusRequest {
    fn new(janus: &str) -> Self {
        Self {
            janus: janus.to_string(),
            transaction: new_transaction_id(),
            session_id: None,
            handle_id: None,
            plugin: None,
            body: None,
            jsep: None,
            candidate: None,
            apisecret: None,
        }
    }

    pub fn create() -> Self {
        Self::new("create")
    }

    pub fn attach(session_id: u64, plugin: &str) -> Self {
        Self {
            session_id: Some(session_id),
            plugin: Some(plugin.to_string()),
            ..Self::new("attach")
        }
    }

    pub fn join(session_id: u64, handle_id: u64, room: u64, display: &str) -> Self {
        Self {
            session_id: Some(session_id),
            handle_id: Some(handle_id),
            body: Some(json!({ "request": "join", "room": room, "display": display })),
            ..Self::new("message")
        }
    }

    pub fn configure_offer(session_id: u64, handle_id: u64, sdp: String) -> Self {
        Self {
            session_id: Some(session_id),
            handle_id: Some(handle_id),
            body: Some(json!({ "request": "configure", "muted": false })),
            jsep: Some(Jsep::offer(sdp)),
            ..Self::new("message")
        }
    }

    pub fn trickle(session_id: u64, handle_id: u64, candidate: TrickleCandidate) -> Self {
        Self {
            session_id: Some(session_id),
            handle_id: Some(handle_id),
            candidate: Some(candidate),
            ..Self::new("trickle")
        }
    }

    pub fn keepalive(session_id: u64) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::new("keepalive")
        }
    }

    pub fn detach(session_id: u64, handle_id: u64) -> Self {
        Self {
            session_id: Some(session_id),
            handle_id: Some(handle_id),
            ..Self::new("detach")
        }
    }

    pub fn destroy(session_id: u64) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::new("destroy")
        }
    }

    pub fn with_secret(mut self, secret: Option<&str>) -> Self {
        self.apisecret = secret.map(str::to_string);
        self
    }
}

fn new_transaction_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct JanusData {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginData {
    pub plugin: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JanusErrorBody {
    pub code: i64,
    pub reason: String,
}

/// Classified `janus` field of an incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JanusKind {
    Success,
    Ack,
    Event,
    Error,
    WebrtcUp,
    Hangup,
    Media,
    Trickle,
    SlowLink,
    Timeout,
    Detached,
    Other(String),
}

/// Incoming gateway message (response or asynchronous event)
#[derive(Debug, Clone, Deserialize)]
pub struct JanusMessage {
    pub janus: String,
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub session_id: Option<u64>,
    #[serde(default)]
    pub sender: Option<u64>,
    #[serde(default)]
    pub data: Option<JanusData>,
    #[serde(default)]
    pub plugindata: Option<PluginData>,
    #[serde(default)]
    pub jsep: Option<Jsep>,
    #[serde(default)]
    pub error: Option<JanusErrorBody>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub candidate: Option<TrickleCandidate>,
    #[serde(default)]
    pub receiving: Option<bool>,
}

impl JanusMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> JanusKind {
        match self.janus.as_str() {
            "success" => JanusKind::Success,
            "ack" => JanusKind::Ack,
            "event" => JanusKind::Event,
            "error" => JanusKind::Error,
            "webrtcup" => JanusKind::WebrtcUp,
            "hangup" => JanusKind::Hangup,
            "media" => JanusKind::Media,
            "trickle" => JanusKind::Trickle,
            "slowlink" => JanusKind::SlowLink,
            "timeout" => JanusKind::Timeout,
            "detached" => JanusKind::Detached,
            other => JanusKind::Other(other.to_string()),
        }
    }

    pub fn is_for(&self, transaction: &str) -> bool {
        self.transaction.as_deref() == Some(transaction)
    }

    /// Error reported by the plugin inside an otherwise successful event
    pub fn plugin_error(&self) -> Option<(i64, String)> {
        let data = &self.plugindata.as_ref()?.data;
        let code = data.get("error_code")?.as_i64()?;
        let reason = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown plugin error")
            .to_string();
        Some((code, reason))
    }

    /// Value of the plugin's discriminator field (e.g. `"joined"`)
    pub fn plugin_event(&self, plugin_key: &str) -> Option<&str> {
        self.plugindata.as_ref()?.data.get(plugin_key)?.as_str()
    }
}
