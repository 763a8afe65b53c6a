//! Error types for streaming sessions.

use thiserror::Error;

/// Errors raised by streaming sessions. None of them reach the owning job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamingError {
    /// A session for this peer already exists.
    #[error("Peer '{0}' already has a stream")]
    PeerInUse(String),

    #[error("Peer id cannot be empty")]
    EmptyPeerId,

    /// Could not reach the signaling server.
    #[error("Failed to connect to {server}: {reason}")]
    Connect { server: String, reason: String },

    /// Transport failure on an open signaling channel.
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// The signaling server closed the channel.
    #[error("Signaling channel closed")]
    Closed,

    /// The signaling server sent an ERROR message.
    #[error("Signaling server rejected session: {0}")]
    Rejected(String),

    /// The per-peer pipeline could not be built or fed.
    #[error("Stream pipeline error: {0}")]
    Pipeline(String),
}

impl StreamingError {
    pub fn connect(server: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connect {
            server: server.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a new attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PeerInUse(_) | Self::EmptyPeerId)
    }
}
