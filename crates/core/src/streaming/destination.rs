//! Frame destination streaming to a WebRTC peer.

use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::manager::{StreamRequest, StreamingSessionManager};
use super::signaling::StreamSettings;
use crate::engine::Frame;
use crate::plugin::{AppDestination, PluginContext, PluginError};

pub const WEBRTC_DESTINATION: &str = "WebRtcDestination";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    /// No frame seen yet.
    Idle,
    /// This destination owns the peer's session.
    Active,
    /// The peer was taken. Frames are dropped.
    Degraded,
    /// Output finished. Late frames are dropped.
    Finished,
}

/// Streams processed frames to one peer.
///
/// The session opens on the first frame. Session failures never surface
/// as frame errors, so the owning job keeps running.
pub struct WebRtcDestination {
    peer_id: String,
    settings: StreamSettings,
    streaming: Arc<StreamingSessionManager>,
    frames: broadcast::Sender<Frame>,
    output: Mutex<Output>,
}

impl WebRtcDestination {
    pub fn construct(ctx: &PluginContext<'_>) -> Result<Arc<dyn AppDestination>, PluginError> {
        let streaming = ctx.streaming.ok_or_else(|| {
            PluginError::construction(WEBRTC_DESTINATION, "streaming is not enabled")
        })?;
        let peer_id = ctx
            .section_str("peer-id")
            .filter(|peer| !peer.is_empty())
            .ok_or_else(|| PluginError::construction(WEBRTC_DESTINATION, "missing peer-id"))?
            .to_string();

        let section = ctx.section;
        let cache_length = section
            .get("cache-length")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(streaming.config().cache_length)
            .max(1);
        let defaults = StreamSettings::default();
        let settings = StreamSettings {
            encode_quality: section
                .get("encode-quality")
                .and_then(|v| v.as_u64())
                .map(|q| q as u32)
                .unwrap_or(defaults.encode_quality),
            sync_with_source: section
                .get("sync-with-source")
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.sync_with_source),
            sync_with_destination: section
                .get("sync-with-destination")
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.sync_with_destination),
        };

        let (frames, _) = broadcast::channel(cache_length);
        Ok(Arc::new(WebRtcDestination {
            peer_id,
            settings,
            streaming: Arc::clone(streaming),
            frames,
            output: Mutex::new(Output::Idle),
        }))
    }

    fn output(&self) -> std::sync::MutexGuard<'_, Output> {
        self.output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AppDestination for WebRtcDestination {
    fn name(&self) -> &str {
        WEBRTC_DESTINATION
    }

    fn process_frame(&self, frame: &Frame) -> Result<(), PluginError> {
        let mut output = self.output();
        if *output == Output::Finished {
            debug!("Dropping frame for finished peer '{}'", self.peer_id);
            return Ok(());
        }
        if *output == Output::Idle {
            let request = StreamRequest {
                peer_id: self.peer_id.clone(),
                caps: frame.caps.clone().unwrap_or_default(),
                settings: self.settings.clone(),
                frames: self.frames.clone(),
            };
            *output = match self.streaming.add_stream(request) {
                Ok(()) => Output::Active,
                Err(e) => {
                    warn!("WebRTC output for peer '{}' disabled: {}", self.peer_id, e);
                    Output::Degraded
                }
            };
        }
        if *output == Output::Active {
            // No subscriber until the peer connects.
            let _ = self.frames.send(frame.clone());
        }
        Ok(())
    }

    fn finish(&self) {
        let mut output = self.output();
        if *output == Output::Active {
            self.streaming.remove_stream(&self.peer_id);
            info!("WebRTC output for peer '{}' finished", self.peer_id);
        }
        *output = Output::Finished;
    }
}
