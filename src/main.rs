use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use voice_relay::inference::{SseResponseStream, WsUploadChannel};
use voice_relay::media::RtpEndpoint;
use voice_relay::signaling::{GatewayChannel, WsGatewayChannel};
use voice_relay::{create_router, AppState, AudioFormat, Config, InferenceClient, SessionOrchestrator, SignalingClient};

#[derive(Parser)]
#[command(name = "voice-relay", version, about = "Real-time audio relay to an inference service")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(long, short, default_value = "config/voice-relay")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept device sessions on the WebSocket endpoint
    Serve,
    /// Join a gateway room and relay its audio as one session
    Gateway {
        /// Room to join instead of the configured one
        #[arg(long)]
        room: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Inference service: {} / {}", cfg.inference.base_url, cfg.inference.ws_url);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Gateway { room } => gateway(cfg, room).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(cfg)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}

async fn gateway(cfg: Config, room: Option<u64>) -> Result<()> {
    let mut settings = cfg.gateway_settings();
    if let Some(room) = room {
        settings.room = room;
    }
    info!("Joining room {} on {}", settings.room, cfg.gateway.url);

    let endpoint = RtpEndpoint::bind(cfg.rtp_bind()?).await?;
    let local_rtp = endpoint.local_addr()?;
    let ssrc = endpoint.ssrc();

    let channel: Box<dyn GatewayChannel> = Box::new(
        WsGatewayChannel::connect(&cfg.gateway.url)
            .await
            .context("Failed to reach the gateway")?,
    );
    let signaling = SignalingClient::new(channel, settings, local_rtp, ssrc);
    let (source, sink) = endpoint.split(AudioFormat::default(), signaling.subscribe(), signaling.endpoint());

    let inference = InferenceClient::new(cfg.inference_settings())?;
    let orchestrator = SessionOrchestrator::new(
        cfg.session_config(),
        Box::new(source),
        Box::new(sink),
        Box::new(WsUploadChannel::new(inference.upload_url()?)),
        Box::new(SseResponseStream::new(inference.clone())),
    )
    .with_envelope(cfg.inference.envelope)
    .with_control(inference)
    .with_signaling(signaling);

    let context = orchestrator.context();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, closing session {}", context.id());
            context.cancel.cancel();
        }
    });

    let stats = orchestrator.run().await?;
    info!("Session stats: {}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
