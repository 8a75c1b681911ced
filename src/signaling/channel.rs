use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{JanusMessage, JanusRequest};
use crate::error::{RelayError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Control channel to the media gateway
#[async_trait]
pub trait GatewayChannel: Send {
    async fn send(&mut self, request: &JanusRequest) -> Result<()>;

    /// Next gateway message, `None` once the channel is closed
    async fn recv(&mut self) -> Result<Option<JanusMessage>>;

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl GatewayChannel for Box<dyn GatewayChannel> {
    async fn send(&mut self, request: &JanusRequest) -> Result<()> {
        (**self).send(request).await
    }

    async fn recv(&mut self) -> Result<Option<JanusMessage>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

/// Janus WebSocket transport (`janus-protocol` subprotocol)
pub struct WsGatewayChannel {
    stream: WsStream,
}

impl WsGatewayChannel {
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to gateway at {}", url);

        let mut request = url
            .into_client_request()
            .map_err(|e| RelayError::Transport(format!("invalid gateway url {}: {}", url, e)))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("janus-protocol"));

        let (stream, _) = connect_async(request).await?;

        info!("Gateway control channel open");
        Ok(Self { stream })
    }
}

#[async_trait]
impl GatewayChannel for WsGatewayChannel {
    async fn send(&mut self, request: &JanusRequest) -> Result<()> {
        let text = serde_json::to_string(request)?;
        debug!("-> gateway: {}", text);
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<JanusMessage>> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => {
                    debug!("<- gateway: {}", text);
                    let parsed = JanusMessage::parse(&text).map_err(|e| {
                        RelayError::Protocol(format!("malformed gateway message: {}", e))
                    })?;
                    return Ok(Some(parsed));
                }
                Message::Close(frame) => {
                    info!("Gateway closed control channel: {:?}", frame);
                    return Ok(None);
                }
                Message::Binary(data) => {
                    warn!("Ignoring {} bytes of binary data on control channel", data.len());
                }
                _ => {}
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
