//! Upload envelopes and response event parsing

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::audio::AudioChunk;
use crate::error::{RelayError, Result};

/// Marker the service appends to the last text of a response
pub const END_MARKER: &str = "<end>";

/// Shape of the JSON message carrying one uploaded chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStyle {
    /// `{"audio": "<base64 wav>"}`
    #[default]
    Simple,
    /// Chat-style `messages` array with an `input_audio` part
    Messages,
}

/// Wrap an already WAV-encoded chunk
///
/// The `messages` form names the conversation with a top-level `uid` when
/// one is given.
pub fn upload_envelope(style: EnvelopeStyle, wav: &[u8], chunk: &AudioChunk, uid: Option<&str>) -> Value {
    let data = BASE64.encode(wav);
    match style {
        EnvelopeStyle::Simple => json!({ "audio": data }),
        EnvelopeStyle::Messages => {
            let mut envelope = json!({
                "messages": [{
                    "role": "user",
                    "content": [{
                        "type": "input_audio",
                        "input_audio": {
                            "data": data,
                            "format": "wav",
                            "timestamp": chunk.captured_at.timestamp_millis().to_string(),
                        }
                    }]
                }]
            });
            if let Some(uid) = uid {
                envelope["uid"] = Value::from(uid);
            }
            envelope
        }
    }
}

/// One unit of the service's reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    Text(String),
    /// Encoded audio (WAV container or raw 16 kHz PCM)
    AudioPayload { bytes: Vec<u8>, sequence: Option<u64> },
}

/// Everything carried by one stream payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPayload {
    pub events: Vec<ResponseEvent>,
    /// The payload closed the current response
    pub end_of_response: bool,
}

/// Parse one `data:` payload of the response stream
///
/// Accepts `{"type":"text"|"audio",...}` events and the chat-completion
/// `{"choices":[{"audio","text"}]}` form. Unknown event types parse to
/// nothing; undecodable payloads are data errors.
pub fn parse_event(payload: &str) -> Result<ParsedPayload> {
    let value: Value = serde_json::from_str(payload.trim())
        .map_err(|e| RelayError::Data(format!("response event is not JSON: {}", e)))?;

    let mut parsed = ParsedPayload::default();

    if let Some(kind) = value.get("type").and_then(Value::as_str) {
        match kind {
            "text" => {
                let content = value
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RelayError::Data("text event without content".into()))?;
                push_text(&mut parsed, content);
            }
            "audio" => {
                let data = value
                    .get("data")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RelayError::Data("audio event without data".into()))?;
                parsed.events.push(ResponseEvent::AudioPayload {
                    bytes: decode_base64(data)?,
                    sequence: value.get("sequence").and_then(Value::as_u64),
                });
            }
            other => tracing::debug!("Ignoring response event of type {}", other),
        }
        return Ok(parsed);
    }

    if let Some(choices) = value.get("choices") {
        let choice = match choices {
            Value::Array(items) => items.first(),
            Value::Object(_) => Some(choices),
            _ => None,
        };
        if let Some(choice) = choice {
            if let Some(audio) = choice.get("audio").and_then(Value::as_str).filter(|a| !a.is_empty()) {
                parsed.events.push(ResponseEvent::AudioPayload {
                    bytes: decode_base64(audio)?,
                    sequence: None,
                });
            }
            if let Some(text) = choice.get("text").and_then(Value::as_str) {
                push_text(&mut parsed, text);
            }
        }
        return Ok(parsed);
    }

    Err(RelayError::Data(format!("unrecognized response event: {}", truncate(payload, 80))))
}

fn push_text(parsed: &mut ParsedPayload, text: &str) {
    if text.contains(END_MARKER) {
        parsed.end_of_response = true;
    }
    let text = text.replace(END_MARKER, "");
    if !text.is_empty() {
        parsed.events.push(ResponseEvent::Text(text));
    }
}

fn decode_base64(data: &str) -> Result<Vec<u8>> {
    Ok(BASE64.decode(data.trim())?)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
