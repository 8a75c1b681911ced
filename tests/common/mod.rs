// In-memory fakes of the relay's I/O seams, shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use voice_relay::audio::decode_wav;
use voice_relay::inference::{ResponseStream, UploadChannel};
use voice_relay::signaling::{GatewayChannel, JanusMessage, JanusRequest};
use voice_relay::{RelayError, Result};

// ============================================================================
// Upload channel
// ============================================================================

/// What a `FakeUpload` observed
#[derive(Clone, Default)]
pub struct UploadLog {
    pub messages: Arc<Mutex<Vec<String>>>,
    pub connects: Arc<AtomicUsize>,
}

impl UploadLog {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// First sample of every uploaded chunk, in upload order
    pub fn first_samples(&self) -> Vec<i16> {
        self.messages()
            .iter()
            .map(|m| {
                let value: Value = serde_json::from_str(m).unwrap();
                let wav = BASE64.decode(value["audio"].as_str().unwrap()).unwrap();
                decode_wav(&wav).unwrap().samples[0]
            })
            .collect()
    }

    /// Sample count of every uploaded chunk
    pub fn chunk_lengths(&self) -> Vec<usize> {
        self.messages()
            .iter()
            .map(|m| {
                let value: Value = serde_json::from_str(m).unwrap();
                let wav = BASE64.decode(value["audio"].as_str().unwrap()).unwrap();
                decode_wav(&wav).unwrap().samples.len()
            })
            .collect()
    }
}

pub struct FakeUpload {
    log: UploadLog,
    failing_sends: usize,
    failing_connects: usize,
}

impl FakeUpload {
    pub fn new() -> (Self, UploadLog) {
        let log = UploadLog::default();
        (
            Self {
                log: log.clone(),
                failing_sends: 0,
                failing_connects: 0,
            },
            log,
        )
    }

    /// The next `n` sends fail with a transport error
    pub fn failing_sends(mut self, n: usize) -> Self {
        self.failing_sends = n;
        self
    }

    /// The next `n` connects fail with a transport error
    pub fn failing_connects(mut self, n: usize) -> Self {
        self.failing_connects = n;
        self
    }
}

#[async_trait]
impl UploadChannel for FakeUpload {
    async fn connect(&mut self) -> Result<()> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        if self.failing_connects > 0 {
            self.failing_connects -= 1;
            return Err(RelayError::Transport("connection refused".into()));
        }
        Ok(())
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        if self.failing_sends > 0 {
            self.failing_sends -= 1;
            return Err(RelayError::Transport("connection reset".into()));
        }
        self.log.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Response stream
// ============================================================================

/// Plays back one script per `open`; blocks forever once scripts run out
pub struct ScriptedResponses {
    scripts: VecDeque<Vec<String>>,
    current: VecDeque<String>,
    pub opens: Arc<AtomicUsize>,
}

impl ScriptedResponses {
    pub fn new(scripts: Vec<Vec<String>>) -> Self {
        Self {
            scripts: scripts.into(),
            current: VecDeque::new(),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ResponseStream for ScriptedResponses {
    async fn open(&mut self) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.scripts.pop_front() {
            Some(script) => {
                self.current = script.into();
                Ok(())
            }
            None => std::future::pending().await,
        }
    }

    async fn next_event(&mut self) -> Result<Option<String>> {
        Ok(self.current.pop_front())
    }
}

pub fn text_event(text: &str) -> String {
    json!({ "type": "text", "content": text }).to_string()
}

pub fn audio_event(pcm: &[u8], sequence: u64) -> String {
    json!({ "type": "audio", "data": BASE64.encode(pcm), "sequence": sequence }).to_string()
}

// ============================================================================
// Janus gateway
// ============================================================================

pub const REMOTE_RTP: &str = "127.0.0.1:40000";

/// How the scripted gateway answers
#[derive(Debug, Clone)]
pub struct GatewayScript {
    pub send_answer: bool,
    pub send_webrtcup: bool,
    pub join_error: Option<(i64, String)>,
    /// Follow every `detach` with a `detached` event for that handle
    pub emit_detached: bool,
}

impl Default for GatewayScript {
    fn default() -> Self {
        Self {
            send_answer: true,
            send_webrtcup: true,
            join_error: None,
            emit_detached: false,
        }
    }
}

/// Gateway that answers requests from a script and accepts injected events
pub struct ScriptedGateway {
    script: GatewayScript,
    inbox_tx: mpsc::UnboundedSender<JanusMessage>,
    inbox_rx: mpsc::UnboundedReceiver<JanusMessage>,
    pub sent: Arc<Mutex<Vec<JanusRequest>>>,
    next_id: u64,
}

impl ScriptedGateway {
    pub fn new(script: GatewayScript) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            script,
            inbox_tx,
            inbox_rx,
            sent: Arc::new(Mutex::new(Vec::new())),
            next_id: 1000,
        }
    }

    /// Handle for pushing asynchronous gateway events
    pub fn injector(&self) -> mpsc::UnboundedSender<JanusMessage> {
        self.inbox_tx.clone()
    }

    fn reply(&self, value: Value) {
        let message = JanusMessage::parse(&value.to_string()).unwrap();
        let _ = self.inbox_tx.send(message);
    }

    fn respond(&mut self, request: &JanusRequest) {
        let tx = request.transaction.clone();
        match request.janus.as_str() {
            "create" | "attach" => {
                self.next_id += 1;
                self.reply(json!({ "janus": "success", "transaction": tx, "data": { "id": self.next_id } }));
            }
            "message" => {
                self.reply(json!({ "janus": "ack", "transaction": tx }));
                let body = request.body.clone().unwrap_or_default();
                match body["request"].as_str() {
                    Some("join") => {
                        let data = match &self.script.join_error {
                            Some((code, reason)) => json!({ "audiobridge": "event", "error_code": code, "error": reason }),
                            None => json!({ "audiobridge": "joined", "room": body["room"], "id": 7 }),
                        };
                        self.reply(json!({
                            "janus": "event",
                            "transaction": tx,
                            "plugindata": { "plugin": "janus.plugin.audiobridge", "data": data }
                        }));
                    }
                    Some("configure") => {
                        if self.script.send_answer {
                            self.reply(json!({
                                "janus": "event",
                                "transaction": tx,
                                "plugindata": { "plugin": "janus.plugin.audiobridge", "data": { "audiobridge": "event", "result": "ok" } },
                                "jsep": { "type": "answer", "sdp": answer_sdp() }
                            }));
                        }
                        if self.script.send_webrtcup {
                            self.reply(json!({ "janus": "webrtcup", "session_id": request.session_id, "sender": request.handle_id }));
                        }
                    }
                    _ => {}
                }
            }
            "trickle" | "keepalive" => self.reply(json!({ "janus": "ack", "transaction": tx })),
            "detach" => {
                self.reply(json!({ "janus": "success", "transaction": tx }));
                if self.script.emit_detached {
                    self.reply(json!({ "janus": "detached", "session_id": request.session_id, "sender": request.handle_id }));
                }
            }
            "destroy" => self.reply(json!({ "janus": "success", "transaction": tx })),
            _ => {}
        }
    }
}

fn answer_sdp() -> String {
    "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=Janus\r\nt=0 0\r\n\
     m=audio 40000 RTP/AVP 96\r\nc=IN IP4 127.0.0.1\r\na=rtpmap:96 L16/16000/1\r\n\
     a=candidate:1 1 udp 2013266431 127.0.0.1 40000 typ host\r\n"
        .to_string()
}

pub fn hangup() -> JanusMessage {
    JanusMessage::parse(r#"{"janus":"hangup","reason":"ICE failed"}"#).unwrap()
}

/// `janus` field of every request sent so far
pub fn sent_kinds(sent: &Arc<Mutex<Vec<JanusRequest>>>) -> Vec<String> {
    sent.lock().unwrap().iter().map(|r| r.janus.clone()).collect()
}

#[async_trait]
impl GatewayChannel for ScriptedGateway {
    async fn send(&mut self, request: &JanusRequest) -> Result<()> {
        self.sent.lock().unwrap().push(request.clone());
        self.respond(request);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<JanusMessage>> {
        Ok(self.inbox_rx.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
