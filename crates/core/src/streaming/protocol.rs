//! Signaling wire format.
//!
//! Control messages are bare text (`HELLO <peer>`, `SESSION <peer>`,
//! `START_WEBRTC_STREAM`, `ERROR ...`); negotiation messages are JSON
//! objects carrying either `sdp` or `ice`.

use serde::{Deserialize, Serialize};

const CAPS_FIELDS: &[&str] = &["video/x-raw", "width", "height", "framerate", "layout", "format"];

/// Session description exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

/// ICE candidate exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u32,
}

/// Negotiation message relayed between a stream pipeline and its peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMessage {
    Sdp(SessionDescription),
    Ice(IceCandidate),
}

impl SignalMessage {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::Sdp(SessionDescription {
            kind: "offer".to_string(),
            sdp: sdp.into(),
        })
    }

    pub fn ice(candidate: impl Into<String>, sdp_mline_index: u32) -> Self {
        Self::Ice(IceCandidate {
            candidate: candidate.into(),
            sdp_mline_index,
        })
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Message received from the signaling server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Registration acknowledged.
    Hello,
    /// The peer is ready; build the stream pipeline.
    StartStream,
    Error(String),
    Signal(SignalMessage),
    /// Text that matches nothing above.
    Unknown(String),
}

impl ServerMessage {
    pub fn parse(text: &str) -> Self {
        match text {
            "HELLO" => Self::Hello,
            "START_WEBRTC_STREAM" => Self::StartStream,
            _ if text.starts_with("ERROR") => Self::Error(text.to_string()),
            _ => match serde_json::from_str::<SignalMessage>(text) {
                Ok(signal) => Self::Signal(signal),
                Err(_) => Self::Unknown(text.to_string()),
            },
        }
    }
}

pub fn hello(peer_id: &str) -> String {
    format!("HELLO {}", peer_id)
}

pub fn session(peer_id: &str) -> String {
    format!("SESSION {}", peer_id)
}

/// Keeps the caps fields a stream pipeline needs to describe raw video.
pub fn select_caps(caps: &str) -> String {
    caps.split(',')
        .map(str::trim)
        .filter(|field| CAPS_FIELDS.iter().any(|wanted| field.contains(wanted)))
        .collect::<Vec<_>>()
        .join(", ")
}
