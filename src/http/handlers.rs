use super::state::AppState;
use crate::audio::AudioFormat;
use crate::inference::{SseResponseStream, WsUploadChannel};
use crate::media::duplex;
use crate::session::{SessionOrchestrator, SessionStats};
use axum::{
    extract::{ws::WebSocket, ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query of the device audio endpoint
#[derive(Debug, Default, Deserialize)]
pub struct DeviceAudioParams {
    /// Input sample rate (default from configuration)
    pub sample_rate: Option<u32>,

    /// Input channel count (default from configuration)
    pub channels: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn not_found(session_id: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session {} not found", session_id),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /ws/audio
/// Device duplex audio channel; one relay session per connection
pub async fn device_audio(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<DeviceAudioParams>,
) -> impl IntoResponse {
    let default = state.config.input_format();
    let format = AudioFormat {
        sample_rate: params.sample_rate.unwrap_or(default.sample_rate),
        channels: params.channels.unwrap_or(default.channels),
    };

    if format.sample_rate == 0 || format.channels == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Unsupported input profile {} Hz x {}", format.sample_rate, format.channels),
            }),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| run_device_session(socket, state, format))
}

async fn run_device_session(socket: WebSocket, state: AppState, format: AudioFormat) {
    let mut config = state.config.session_config();
    config.input_format = format;
    let session_id = config.session_id.clone();

    // One inference identity per device session
    let inference = state
        .inference
        .with_uid(format!("{}-{}", state.inference.settings().uid, &session_id[session_id.len().saturating_sub(8)..]));
    let upload_url = match inference.upload_url() {
        Ok(url) => url,
        Err(e) => {
            error!("Cannot build upload url: {}", e);
            return;
        }
    };

    let (source, sink) = duplex::split(socket, format);
    let orchestrator = SessionOrchestrator::new(
        config,
        Box::new(source),
        Box::new(sink),
        Box::new(WsUploadChannel::new(upload_url)),
        Box::new(SseResponseStream::new(inference.clone())),
    )
    .with_envelope(inference.settings().envelope)
    .with_control(inference);

    state.register(orchestrator.context()).await;
    info!("Device connected: session {} ({} Hz x {})", session_id, format.sample_rate, format.channels);

    match orchestrator.run().await {
        Ok(stats) => info!("Session {} closed cleanly ({} chunks)", session_id, stats.chunks_uploaded),
        Err(e) => error!("Session {} failed: {}", session_id, e),
    }

    state.deregister(&session_id).await;
}

/// GET /sessions
/// Statistics of every active session
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.read().await;
    let mut stats: Vec<SessionStats> = sessions.values().map(|ctx| ctx.stats()).collect();
    stats.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    (StatusCode::OK, Json(stats))
}

/// GET /sessions/:session_id
/// Statistics of one session
pub async fn get_session(State(state): State<AppState>, Path(session_id): Path<String>) -> impl IntoResponse {
    let sessions = state.sessions.read().await;
    match sessions.get(&session_id) {
        Some(ctx) => (StatusCode::OK, Json(ctx.stats())).into_response(),
        None => not_found(&session_id),
    }
}

/// DELETE /sessions/:session_id
/// Cancel a session; it deregisters itself once torn down
pub async fn stop_session(State(state): State<AppState>, Path(session_id): Path<String>) -> impl IntoResponse {
    let sessions = state.sessions.read().await;
    match sessions.get(&session_id) {
        Some(ctx) => {
            info!("Stopping session {} on request", session_id);
            ctx.cancel.cancel();
            (
                StatusCode::ACCEPTED,
                Json(StopSessionResponse {
                    session_id: session_id.clone(),
                    status: "stopping".to_string(),
                    stats: ctx.stats(),
                }),
            )
                .into_response()
        }
        None => not_found(&session_id),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
