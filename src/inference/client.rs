use reqwest::Url;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::messages::EnvelopeStyle;
use crate::error::{RelayError, Result};

/// Where and how to reach the inference service
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    /// HTTP API base, e.g. `http://localhost:32550`
    pub base_url: String,
    /// WebSocket base for the upload channel, e.g. `ws://localhost:32550`
    pub ws_url: String,
    /// Client identity sent as the `uid` header / query parameter
    pub uid: String,
    /// Service name selected on the upload channel
    pub service: String,
    pub envelope: EnvelopeStyle,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:32550".to_string(),
            ws_url: "ws://localhost:32550".to_string(),
            uid: "voice-relay".to_string(),
            service: "minicpmo-server".to_string(),
            envelope: EnvelopeStyle::Simple,
        }
    }
}

/// HTTP side of the inference service
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    settings: InferenceSettings,
}

impl InferenceClient {
    pub fn new(settings: InferenceSettings) -> Result<Self> {
        if !settings.base_url.starts_with("http://") && !settings.base_url.starts_with("https://") {
            return Err(RelayError::Transport(format!(
                "inference base_url must start with http:// or https://, got: {}",
                settings.base_url
            )));
        }

        // No overall timeout: the completions stream stays open for a whole response.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RelayError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }

    /// Same connection pool, different client identity
    pub fn with_uid(&self, uid: impl Into<String>) -> Self {
        let mut client = self.clone();
        client.settings.uid = uid.into();
        client
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// Upload channel URL: `{ws_url}/ws/stream?uid=..&service=..`
    pub fn upload_url(&self) -> Result<String> {
        let base = format!("{}/ws/stream", self.settings.ws_url.trim_end_matches('/'));
        let mut url = Url::parse(&base)
            .map_err(|e| RelayError::Transport(format!("invalid upload url {}: {}", base, e)))?;
        url.query_pairs_mut()
            .append_pair("uid", &self.settings.uid)
            .append_pair("service", &self.settings.service);
        Ok(url.to_string())
    }

    /// Push the opaque session options (voice, prompts, VAD threshold...)
    pub async fn push_config(&self, options: &Value) -> Result<()> {
        let url = self.endpoint("/api/v1/init_options");
        info!("Pushing session options to {}", url);

        let response = self
            .http
            .post(&url)
            .header("uid", &self.settings.uid)
            .json(options)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Inference(format!("init_options returned {}: {}", status, body)));
        }
        Ok(())
    }

    /// Ask the service to end the current conversation
    pub async fn stop(&self) -> Result<()> {
        let url = self.endpoint("/api/v1/stop");
        debug!("Stopping conversation via {}", url);

        let response = self
            .http
            .post(&url)
            .header("uid", &self.settings.uid)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RelayError::Inference(format!("stop returned {}", response.status())));
        }
        Ok(())
    }

    /// Open the server-sent event stream of the next response
    pub async fn open_completions(&self) -> Result<reqwest::Response> {
        let url = self.endpoint("/api/v1/completions");
        let body = json!({
            "messages": [{ "role": "user", "content": [{ "type": "none" }] }],
            "stream": true,
        });

        let response = self
            .http
            .post(&url)
            .header("uid", &self.settings.uid)
            .header("service", &self.settings.service)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RelayError::Inference(format!("completions returned {}", response.status())));
        }
        Ok(response)
    }
}
