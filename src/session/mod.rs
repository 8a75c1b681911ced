//! Relay session management
//!
//! One session per device connection. It owns:
//! - the cancellation token observed by every task
//! - the shared counters behind `SessionStats`
//! - the orchestrator that wires inbound, uplink, downlink and outbound
//!   tasks together and tears them down

mod cancel;
mod config;
mod context;
mod orchestrator;
mod stats;

pub use cancel::CancelToken;
pub use config::SessionConfig;
pub use context::SessionContext;
pub use orchestrator::{SessionOrchestrator, SessionSignaling};
pub use stats::{RelayCounters, SessionStats};
