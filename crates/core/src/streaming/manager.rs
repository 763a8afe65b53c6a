//! Registry of live per-peer streaming sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::config::StreamingConfig;
use super::error::StreamingError;
use super::protocol::select_caps;
use super::session::{Session, SessionInfo, SessionState};
use super::signaling::{SignalingConnector, StreamPipelineFactory, StreamSettings};
use crate::engine::Frame;

/// Request to open a stream to one peer.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub peer_id: String,
    /// Caps of the frames as produced by the engine.
    pub caps: String,
    pub settings: StreamSettings,
    /// Producer side of the frame buffer feeding the peer.
    pub frames: broadcast::Sender<Frame>,
}

struct SessionEntry {
    stop: watch::Sender<bool>,
    info: watch::Receiver<SessionInfo>,
    task: JoinHandle<()>,
}

/// Owns every outbound streaming session, keyed by peer id.
///
/// At most one session exists per peer. A session that exhausted its
/// retries stays registered as `Abandoned` until its owner removes it.
pub struct StreamingSessionManager {
    config: StreamingConfig,
    connector: Arc<dyn SignalingConnector>,
    factory: Arc<dyn StreamPipelineFactory>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl StreamingSessionManager {
    pub fn new(
        config: StreamingConfig,
        connector: Arc<dyn SignalingConnector>,
        factory: Arc<dyn StreamPipelineFactory>,
    ) -> Self {
        Self {
            config,
            connector,
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a session for `request.peer_id`. Must be called within a
    /// Tokio runtime.
    pub fn add_stream(&self, request: StreamRequest) -> Result<(), StreamingError> {
        if request.peer_id.is_empty() {
            return Err(StreamingError::EmptyPeerId);
        }
        let mut sessions = self.sessions();
        if sessions.contains_key(&request.peer_id) {
            return Err(StreamingError::PeerInUse(request.peer_id));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (info_tx, info_rx) = watch::channel(SessionInfo {
            peer_id: request.peer_id.clone(),
            state: SessionState::Connecting,
            retries: 0,
        });
        let session = Session {
            peer_id: request.peer_id.clone(),
            caps: select_caps(&request.caps),
            settings: request.settings,
            frames: request.frames,
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            factory: Arc::clone(&self.factory),
            info: info_tx,
            stop: stop_rx,
        };

        info!(
            "Starting stream for peer '{}' via {}",
            request.peer_id, self.config.signaling_server
        );
        let task = tokio::spawn(session.run());
        sessions.insert(
            request.peer_id,
            SessionEntry {
                stop: stop_tx,
                info: info_rx,
                task,
            },
        );
        Ok(())
    }

    /// Stops and forgets the session for `peer_id`. Idempotent.
    ///
    /// Returns whether a session was registered.
    pub fn remove_stream(&self, peer_id: &str) -> bool {
        let entry = self.sessions().remove(peer_id);
        match entry {
            Some(entry) => {
                info!("Stopping stream for peer '{}'", peer_id);
                let _ = entry.stop.send(true);
                true
            }
            None => false,
        }
    }

    pub fn session_info(&self, peer_id: &str) -> Option<SessionInfo> {
        self.sessions()
            .get(peer_id)
            .map(|entry| entry.info.borrow().clone())
    }

    /// Change feed for a session, for callers that wait on its state.
    pub fn watch_session(&self, peer_id: &str) -> Option<watch::Receiver<SessionInfo>> {
        self.sessions().get(peer_id).map(|entry| entry.info.clone())
    }

    /// Snapshots of every registered session, ordered by peer id.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions()
            .values()
            .map(|entry| entry.info.borrow().clone())
            .collect();
        infos.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        infos
    }

    /// Stops every session and waits for their teardown.
    pub async fn shutdown(&self) {
        let entries: Vec<(String, SessionEntry)> = self.sessions().drain().collect();
        for (peer_id, entry) in entries {
            let _ = entry.stop.send(true);
            if let Err(e) = entry.task.await {
                debug!("Stream task for '{}' ended abnormally: {}", peer_id, e);
            }
        }
    }
}
