//! Source and destination plugin contracts.

use serde_json::Value;
use std::sync::Arc;

use super::channel::ChannelHub;
use super::error::PluginError;
use crate::engine::{Frame, FrameInput};
use crate::request::PipelineRequest;
use crate::streaming::StreamingSessionManager;

/// Application-provided frame source.
///
/// The engine drives back-pressure: `start_frames` means it can take more
/// input, `pause_frames` means it cannot. Either may be called repeatedly
/// and in any order.
pub trait AppSource: Send + Sync {
    fn name(&self) -> &str;

    fn start_frames(&self);

    fn pause_frames(&self);

    /// Called exactly once when the instance reaches a terminal state.
    fn finish(&self);
}

/// Application-provided frame sink.
pub trait AppDestination: Send + Sync {
    fn name(&self) -> &str;

    /// Receives one processed frame.
    fn process_frame(&self, frame: &Frame) -> Result<(), PluginError>;

    /// Called exactly once when the instance reaches a terminal state.
    fn finish(&self);
}

/// What a plugin constructor sees of the instance it is built for.
pub struct PluginContext<'a> {
    pub instance_id: &'a str,
    pub engine_type: &'a str,
    pub request: &'a PipelineRequest,
    /// The `source` section, or the sub-destination section.
    pub section: &'a Value,
    /// Engine input, for sources.
    pub input: Option<FrameInput>,
    pub hub: &'a Arc<ChannelHub>,
    pub streaming: Option<&'a Arc<StreamingSessionManager>>,
}

impl PluginContext<'_> {
    /// String field of the section.
    pub fn section_str(&self, key: &str) -> Option<&str> {
        self.section.get(key).and_then(Value::as_str)
    }
}

pub type SourceConstructor =
    Arc<dyn Fn(&PluginContext<'_>) -> Result<Arc<dyn AppSource>, PluginError> + Send + Sync>;

pub type DestinationConstructor =
    Arc<dyn Fn(&PluginContext<'_>) -> Result<Arc<dyn AppDestination>, PluginError> + Send + Sync>;
