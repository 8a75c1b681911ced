//! HTTP API server for devices and operators
//!
//! - GET /ws/audio?sample_rate=&channels= - Device duplex audio (WebSocket)
//! - GET /sessions - Statistics of active sessions
//! - GET /sessions/:id - Statistics of one session
//! - DELETE /sessions/:id - Cancel a session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
