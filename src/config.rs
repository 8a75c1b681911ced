use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::audio::AudioFormat;
use crate::inference::{EnvelopeStyle, InferenceSettings};
use crate::session::SessionConfig;
use crate::signaling::GatewaySettings;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub inference: InferenceConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-relay".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Device input profile when the client does not declare one
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u64,
    pub chunk_duration_ms: u64,
    pub channel_capacity: usize,
    pub playback_capacity: usize,
    pub playback_push_timeout_ms: u64,
    pub reopen_delay_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            frame_duration_ms: 20,
            chunk_duration_ms: 1000,
            channel_capacity: 64,
            playback_capacity: 256,
            playback_push_timeout_ms: 5000,
            reopen_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub ws_url: String,
    pub uid: String,
    pub service: String,
    pub envelope: EnvelopeStyle,
    /// Opaque options pushed to `init_options` when a session starts
    pub session_options: Option<serde_json::Value>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let defaults = InferenceSettings::default();
        Self {
            base_url: defaults.base_url,
            ws_url: defaults.ws_url,
            uid: defaults.uid,
            service: defaults.service,
            envelope: defaults.envelope,
            session_options: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Janus WebSocket endpoint
    pub url: String,
    pub plugin: String,
    pub room: u64,
    pub display: String,
    pub api_secret: Option<String>,
    pub negotiation_timeout_ms: u64,
    pub keepalive_secs: u64,
    pub assume_ice_on_answer: bool,
    /// Local UDP address for the RTP track
    pub rtp_bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let defaults = GatewaySettings::default();
        Self {
            url: "ws://localhost:8188".to_string(),
            plugin: defaults.plugin,
            room: defaults.room,
            display: defaults.display,
            api_secret: None,
            negotiation_timeout_ms: defaults.negotiation_timeout.as_millis() as u64,
            keepalive_secs: defaults.keepalive_interval.as_secs(),
            assume_ice_on_answer: defaults.assume_ice_on_answer,
            rtp_bind: "0.0.0.0:0".to_string(),
        }
    }
}

impl Config {
    /// Load `path` (any extension the `config` crate knows, optional) with
    /// `RELAY__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.audio.sample_rate > 0, "audio.sample_rate must be positive");
        anyhow::ensure!(self.audio.channels > 0, "audio.channels must be positive");
        anyhow::ensure!(self.audio.frame_duration_ms > 0, "audio.frame_duration_ms must be positive");
        anyhow::ensure!(
            self.audio.chunk_duration_ms >= self.audio.frame_duration_ms,
            "audio.chunk_duration_ms must be at least one frame"
        );
        anyhow::ensure!(self.audio.playback_capacity > 0, "audio.playback_capacity must be positive");
        Ok(())
    }

    pub fn input_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
        }
    }

    /// Session template; each session gets a fresh id
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            input_format: self.input_format(),
            frame_duration: Duration::from_millis(self.audio.frame_duration_ms),
            chunk_duration: Duration::from_millis(self.audio.chunk_duration_ms),
            channel_capacity: self.audio.channel_capacity.max(1),
            playback_capacity: self.audio.playback_capacity,
            playback_push_timeout: Duration::from_millis(self.audio.playback_push_timeout_ms),
            reopen_delay: Duration::from_millis(self.audio.reopen_delay_ms),
            session_options: self.inference.session_options.clone(),
            ..SessionConfig::default()
        }
    }

    pub fn inference_settings(&self) -> InferenceSettings {
        InferenceSettings {
            base_url: self.inference.base_url.clone(),
            ws_url: self.inference.ws_url.clone(),
            uid: self.inference.uid.clone(),
            service: self.inference.service.clone(),
            envelope: self.inference.envelope,
        }
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            plugin: self.gateway.plugin.clone(),
            room: self.gateway.room,
            display: self.gateway.display.clone(),
            negotiation_timeout: Duration::from_millis(self.gateway.negotiation_timeout_ms),
            keepalive_interval: Duration::from_secs(self.gateway.keepalive_secs.max(1)),
            api_secret: self.gateway.api_secret.clone(),
            assume_ice_on_answer: self.gateway.assume_ice_on_answer,
            sample_rate: AudioFormat::default().sample_rate,
            ptime_ms: self.audio.frame_duration_ms as u32,
        }
    }

    pub fn rtp_bind(&self) -> Result<SocketAddr> {
        self.gateway
            .rtp_bind
            .parse()
            .with_context(|| format!("Invalid gateway.rtp_bind: {}", self.gateway.rtp_bind))
    }
}
