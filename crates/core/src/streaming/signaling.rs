//! Signaling transport and stream pipeline contracts.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::error::StreamingError;
use super::protocol::SignalMessage;
use crate::engine::Frame;

/// An open text channel to the signaling server.
#[async_trait]
pub trait SignalingChannel: Send {
    async fn send(&mut self, text: String) -> Result<(), StreamingError>;

    /// Next text message. `Ok(None)` means the server closed the channel.
    async fn recv(&mut self) -> Result<Option<String>, StreamingError>;

    async fn close(&mut self);
}

/// Opens signaling channels.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    async fn connect(&self, server: &str) -> Result<Box<dyn SignalingChannel>, StreamingError>;
}

/// Encoder settings requested by a webrtc destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub encode_quality: u32,
    pub sync_with_source: bool,
    pub sync_with_destination: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            encode_quality: 10,
            sync_with_source: true,
            sync_with_destination: true,
        }
    }
}

/// Everything needed to build the pipeline serving one peer.
#[derive(Debug)]
pub struct StreamPipelineRequest {
    pub peer_id: String,
    /// Raw video caps of the frames.
    pub caps: String,
    pub settings: StreamSettings,
    pub frames: broadcast::Receiver<Frame>,
    /// Offers and candidates to relay to the peer.
    pub outbound: mpsc::UnboundedSender<SignalMessage>,
}

/// Per-peer micro-pipeline encoding frames for one viewer.
pub trait StreamPipeline: Send {
    /// Applies an answer or candidate from the peer.
    fn handle_signal(&mut self, message: SignalMessage) -> Result<(), StreamingError>;

    /// Stops the pipeline and frees its backend resources.
    fn release(self: Box<Self>);
}

/// Builds stream pipelines. Provided by engines that can encode for peers.
pub trait StreamPipelineFactory: Send + Sync {
    fn create(
        &self,
        request: StreamPipelineRequest,
    ) -> Result<Box<dyn StreamPipeline>, StreamingError>;
}

// =============================================================================
// WebSocket transport
// =============================================================================

/// Connects to the signaling server over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

struct WebSocketChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SignalingConnector for WebSocketConnector {
    async fn connect(&self, server: &str) -> Result<Box<dyn SignalingChannel>, StreamingError> {
        let (stream, _response) = connect_async(server)
            .await
            .map_err(|e| StreamingError::connect(server, e))?;
        debug!("Connected to signaling server {}", server);
        Ok(Box::new(WebSocketChannel { stream }))
    }
}

#[async_trait]
impl SignalingChannel for WebSocketChannel {
    async fn send(&mut self, text: String) -> Result<(), StreamingError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| StreamingError::Signaling(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, StreamingError> {
        while let Some(message) = self.stream.next().await {
            match message.map_err(|e| StreamingError::Signaling(e.to_string()))? {
                Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Signaling close failed: {}", e);
        }
    }
}
