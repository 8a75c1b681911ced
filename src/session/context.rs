use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

use super::cancel::CancelToken;
use super::config::SessionConfig;
use super::stats::{RelayCounters, SessionStats};
use crate::signaling::SignalingState;

/// Everything the tasks of one session share
///
/// Cloning is cheap; clones observe the same counters and cancellation.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub config: Arc<SessionConfig>,
    pub started_at: DateTime<Utc>,
    pub counters: Arc<RelayCounters>,
    pub cancel: CancelToken,
    signaling: Option<watch::Receiver<SignalingState>>,
}

impl SessionContext {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config: Arc::new(config),
            started_at: Utc::now(),
            counters: Arc::new(RelayCounters::default()),
            cancel: CancelToken::new(),
            signaling: None,
        }
    }

    pub fn with_signaling(mut self, state: watch::Receiver<SignalingState>) -> Self {
        self.signaling = Some(state);
        self
    }

    pub fn id(&self) -> &str {
        &self.config.session_id
    }

    pub fn signaling_state(&self) -> Option<SignalingState> {
        self.signaling.as_ref().map(|rx| *rx.borrow())
    }

    /// Current statistics
    pub fn stats(&self) -> SessionStats {
        let mut stats = self.counters.snapshot(self.id(), self.started_at);
        stats.signaling_state = self.signaling_state().map(|s| s.to_string());
        stats
    }
}
