//! One peer's signaling session with reconnect.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use super::config::StreamingConfig;
use super::error::StreamingError;
use super::protocol::{self, ServerMessage, SignalMessage};
use super::signaling::{
    SignalingChannel, SignalingConnector, StreamPipeline, StreamPipelineFactory,
    StreamPipelineRequest, StreamSettings,
};
use crate::engine::Frame;
use crate::metrics;

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Opening the signaling channel.
    Connecting,
    /// Registered, waiting for the peer.
    Negotiating,
    /// A stream pipeline serves the peer.
    Streaming,
    /// Retries exhausted. The output is degraded for good.
    Abandoned,
    /// Stopped on request.
    Closed,
}

impl SessionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Abandoned | Self::Closed)
    }
}

/// Snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub peer_id: String,
    pub state: SessionState,
    /// Failed attempts so far.
    pub retries: u32,
}

/// Resolves once a stop is requested or the stop sender is gone.
async fn stopped(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

enum Attempt {
    Stopped,
    Failed(StreamingError),
}

pub(crate) struct Session {
    pub peer_id: String,
    pub caps: String,
    pub settings: StreamSettings,
    pub frames: broadcast::Sender<Frame>,
    pub config: StreamingConfig,
    pub connector: Arc<dyn SignalingConnector>,
    pub factory: Arc<dyn StreamPipelineFactory>,
    pub info: watch::Sender<SessionInfo>,
    pub stop: watch::Receiver<bool>,
}

impl Session {
    fn set_state(&self, state: SessionState) {
        self.info.send_modify(|info| info.state = state);
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    pub(crate) async fn run(mut self) {
        metrics::STREAM_SESSIONS_ACTIVE.inc();
        let final_state = self.run_attempts().await;
        self.set_state(final_state);
        metrics::STREAM_SESSIONS_ACTIVE.dec();
        info!("Stream for peer '{}' ended: {:?}", self.peer_id, final_state);
    }

    async fn run_attempts(&mut self) -> SessionState {
        let mut retries = 0u32;
        loop {
            if self.stop_requested() {
                return SessionState::Closed;
            }
            self.set_state(SessionState::Connecting);

            match self.attempt().await {
                Attempt::Stopped => return SessionState::Closed,
                Attempt::Failed(e) => {
                    warn!("Stream for peer '{}' failed: {}", self.peer_id, e);
                }
            }

            retries += 1;
            self.info.send_modify(|info| info.retries = retries);
            if retries > self.config.retry.max_attempts {
                warn!(
                    "Abandoning stream for peer '{}' after {} retries",
                    self.peer_id, self.config.retry.max_attempts
                );
                return SessionState::Abandoned;
            }
            metrics::STREAM_RETRIES.inc();

            let delay = self.config.retry.delay_for(retries);
            warn!(
                "Attempt {}/{} to restart stream for peer '{}' begins in {:?}",
                retries, self.config.retry.max_attempts, self.peer_id, delay
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stopped(self.stop.clone()) => return SessionState::Closed,
            }
        }
    }

    async fn attempt(&mut self) -> Attempt {
        let connected = tokio::select! {
            result = self.connector.connect(&self.config.signaling_server) => result,
            _ = stopped(self.stop.clone()) => return Attempt::Stopped,
        };
        let mut channel = match connected {
            Ok(channel) => channel,
            Err(e) => return Attempt::Failed(e),
        };

        let mut pipeline: Option<Box<dyn StreamPipeline>> = None;
        let outcome = self.exchange(channel.as_mut(), &mut pipeline).await;

        // The peer must see the channel close before the pipeline goes away.
        channel.close().await;
        if let Some(pipeline) = pipeline.take() {
            pipeline.release();
        }
        outcome
    }

    async fn exchange(
        &mut self,
        channel: &mut dyn SignalingChannel,
        pipeline: &mut Option<Box<dyn StreamPipeline>>,
    ) -> Attempt {
        if let Err(e) = channel.send(protocol::hello(&self.peer_id)).await {
            return Attempt::Failed(e);
        }

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<SignalMessage>();
        let recv_timeout = self.config.recv_timeout();

        loop {
            tokio::select! {
                _ = stopped(self.stop.clone()) => return Attempt::Stopped,
                Some(message) = outbound_rx.recv() => {
                    let text = match message.to_text() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Dropping unencodable signal for '{}': {}", self.peer_id, e);
                            continue;
                        }
                    };
                    if let Err(e) = channel.send(text).await {
                        return Attempt::Failed(e);
                    }
                }
                received = tokio::time::timeout(recv_timeout, channel.recv()) => {
                    let text = match received {
                        Err(_) => continue,
                        Ok(Ok(Some(text))) => text,
                        Ok(Ok(None)) => return Attempt::Failed(StreamingError::Closed),
                        Ok(Err(e)) => return Attempt::Failed(e),
                    };
                    if let Err(e) = self.handle(&text, channel, pipeline, &outbound_tx).await {
                        return Attempt::Failed(e);
                    }
                }
            }
        }
    }

    async fn handle(
        &mut self,
        text: &str,
        channel: &mut dyn SignalingChannel,
        pipeline: &mut Option<Box<dyn StreamPipeline>>,
        outbound: &mpsc::UnboundedSender<SignalMessage>,
    ) -> Result<(), StreamingError> {
        match ServerMessage::parse(text) {
            ServerMessage::Hello => {
                channel.send(protocol::session(&self.peer_id)).await?;
                self.set_state(SessionState::Negotiating);
                debug!("Registered stream for peer '{}'", self.peer_id);
            }
            ServerMessage::StartStream => {
                if let Some(previous) = pipeline.take() {
                    previous.release();
                }
                let request = StreamPipelineRequest {
                    peer_id: self.peer_id.clone(),
                    caps: self.caps.clone(),
                    settings: self.settings.clone(),
                    frames: self.frames.subscribe(),
                    outbound: outbound.clone(),
                };
                *pipeline = Some(self.factory.create(request)?);
                self.set_state(SessionState::Streaming);
                info!("Stream pipeline started for peer '{}'", self.peer_id);
            }
            ServerMessage::Error(message) => return Err(StreamingError::Rejected(message)),
            ServerMessage::Signal(signal) => match pipeline.as_mut() {
                Some(pipeline) => {
                    if let Err(e) = pipeline.handle_signal(signal) {
                        warn!("Peer '{}' signal rejected: {}", self.peer_id, e);
                    }
                }
                None => debug!("Peer '{}' not streaming yet, ignoring signal", self.peer_id),
            },
            ServerMessage::Unknown(text) => {
                warn!("Unrecognized signaling message for '{}': {}", self.peer_id, text);
            }
        }
        Ok(())
    }
}
