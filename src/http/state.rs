use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::inference::InferenceClient;
use crate::session::SessionContext;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active relay sessions (session_id → shared context)
    pub sessions: Arc<RwLock<HashMap<String, SessionContext>>>,

    /// Loaded configuration, used as the template for new sessions
    pub config: Arc<Config>,

    /// HTTP client for the inference service
    pub inference: InferenceClient,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let inference = InferenceClient::new(config.inference_settings())?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            inference,
        })
    }

    pub async fn register(&self, context: SessionContext) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(context.id().to_string(), context);
    }

    pub async fn deregister(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
    }
}
