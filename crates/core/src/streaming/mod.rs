//! Outbound live-stream sessions.
//!
//! A `webrtc` frame destination hands frames to a [`StreamingSessionManager`],
//! which negotiates with a signaling server and builds a per-peer stream
//! pipeline through a [`StreamPipelineFactory`]. Failed sessions retry with
//! backoff and are abandoned at the retry ceiling without touching the job.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pipeserve_core::streaming::{StreamingConfig, StreamingSessionManager, WebSocketConnector};
//!
//! let manager = StreamingSessionManager::new(
//!     StreamingConfig::default().with_signaling_server("ws://localhost:8443"),
//!     Arc::new(WebSocketConnector),
//!     factory,
//! );
//! ```

mod config;
mod destination;
mod error;
mod manager;
mod protocol;
mod session;
mod signaling;

pub use config::{RetryConfig, StreamingConfig};
pub use destination::{WebRtcDestination, WEBRTC_DESTINATION};
pub use error::StreamingError;
pub use manager::{StreamRequest, StreamingSessionManager};
pub use protocol::{
    hello, select_caps, session, IceCandidate, ServerMessage, SessionDescription, SignalMessage,
};
pub use session::{SessionInfo, SessionState};
pub use signaling::{
    SignalingChannel, SignalingConnector, StreamPipeline, StreamPipelineFactory,
    StreamPipelineRequest, StreamSettings, WebSocketConnector,
};
